// src/prompt.rs
//! Prompt text. The system instruction is a style guide for the channel's
//! voice; the pipeline treats it as opaque configuration.

use crate::queue::Market;

pub const SYSTEM_PROMPT: &str = "You are a senior trading educator writing posts for a Telegram channel. \
Write clear, practical, beginner-friendly lessons with concrete examples. \
Format with simple HTML only: <b>bold</b> for key terms, <i>italic</i> for emphasis, \
<code>code</code> for tickers and numbers, and plain line breaks between sections. \
Do not use Markdown, tables, images or headings beyond a bold first line. \
Open with a bold title line, then explain the concept, give a worked example, \
list two or three actionable tips as short lines starting with a bullet, and close with a risk reminder. \
Never promise profits, never give personal financial advice, never invent prices or statistics. \
Stay under 2500 characters.";

fn market_label(market: Market) -> &'static str {
    match market {
        Market::Crypto => "cryptocurrency",
        Market::Forex => "forex (foreign exchange)",
    }
}

/// User prompt for a queued subject.
pub fn subject_prompt(subject: &str, market: Market) -> String {
    format!(
        "Write an educational post for {label} traders about: \"{subject}\".\n\
         Explain what it is, why it matters in the {market} market, how to apply it step by step, \
         and the most common mistakes to avoid.",
        label = market_label(market),
        subject = subject.trim(),
    )
}

/// Generic prompt used when the queue is empty.
pub fn generic_prompt(market: Market) -> String {
    format!(
        "Write an educational post for {label} traders. \
         Pick one practical topic (for example risk management, position sizing, \
         a chart pattern, an indicator, or trading psychology) that is relevant to the {market} market today, \
         and teach it with a concrete example.",
        label = market_label(market),
    )
}

pub fn build_prompt(subject: Option<&str>, market: Market) -> String {
    match subject.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => subject_prompt(s, market),
        None => generic_prompt(market),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_embedded_with_market() {
        let p = build_prompt(Some("  Fibonacci retracement "), Market::Forex);
        assert!(p.contains("\"Fibonacci retracement\""));
        assert!(p.contains("forex"));
    }

    #[test]
    fn blank_subject_uses_generic_template() {
        assert_eq!(build_prompt(Some("   "), Market::Crypto), generic_prompt(Market::Crypto));
        assert!(build_prompt(None, Market::Crypto).contains("cryptocurrency"));
    }
}
