//! Document flows: requirements editing, PRD generation, conversation review
//!
//! Each is one plain-mode generation over a rendered input. Nothing is
//! persisted here.

use chrono::NaiveDate;
use specdrafter_common::ConversationEntry;

use super::gateway::{Gateway, Instruction, TextStream};
use super::prompts;
use crate::provider::{Content, ProviderResult};

/// Target environment used when the client names none
pub const DEFAULT_PRD_TARGET: &str = "Cursor";

/// Full replacement of `current` with `instruction` applied
pub async fn edit_requirements(
    gateway: &Gateway,
    current: &str,
    instruction: &str,
) -> ProviderResult<TextStream> {
    let prompt = format!(
        "Here is the current document:\n\n---\n\n{}\n\n---\n\nPlease apply this instruction: {}",
        current, instruction
    );
    gateway
        .generate_text(
            &Instruction::primed(prompts::EDIT_INSTRUCTION, prompts::EDIT_ACKNOWLEDGEMENT),
            vec![Content::user_text(prompt)],
        )
        .await
}

/// `role: content` blocks separated by blank lines
pub fn render_prd_log(history: &[ConversationEntry]) -> String {
    history
        .iter()
        .map(|entry| format!("{}: {}", entry.role.as_str(), entry.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn prd_prompt(history: &[ConversationEntry], date: NaiveDate) -> String {
    format!(
        "**Date:** {}\n\n**Conversation History:**\n{}",
        date.format("%B %d, %Y"),
        render_prd_log(history)
    )
}

pub async fn generate_prd(
    gateway: &Gateway,
    history: &[ConversationEntry],
    target: &str,
    date: NaiveDate,
) -> ProviderResult<TextStream> {
    gateway
        .generate_text(
            &Instruction::primed(prompts::prd_instruction(target), prompts::PRD_ACKNOWLEDGEMENT),
            vec![Content::user_text(prd_prompt(history, date))],
        )
        .await
}

/// `**Role**: content` blocks separated by horizontal rules
pub fn render_review_log(history: &[ConversationEntry]) -> String {
    history
        .iter()
        .map(|entry| format!("**{}**: {}", entry.role.label(), entry.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub async fn review(gateway: &Gateway, history: &[ConversationEntry]) -> ProviderResult<TextStream> {
    let prompt = format!(
        "Here is the conversation history:\n\n{}",
        render_review_log(history)
    );
    gateway
        .generate_text(
            &Instruction::primed(prompts::REVIEW_INSTRUCTION, prompts::REVIEW_ACKNOWLEDGEMENT),
            vec![Content::user_text(prompt)],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<ConversationEntry> {
        vec![
            ConversationEntry::assistant("What are we building?", None),
            ConversationEntry::user("A recipe app", None),
        ]
    }

    #[test]
    fn test_render_prd_log() {
        assert_eq!(
            render_prd_log(&history()),
            "assistant: What are we building?\n\nuser: A recipe app"
        );
    }

    #[test]
    fn test_prd_prompt_formats_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let prompt = prd_prompt(&history(), date);
        assert!(prompt.starts_with("**Date:** March 07, 2025\n\n**Conversation History:**\n"));
        assert!(prompt.ends_with("user: A recipe app"));
    }

    #[test]
    fn test_render_review_log() {
        assert_eq!(
            render_review_log(&history()),
            "**Assistant**: What are we building?\n\n---\n\n**User**: A recipe app"
        );
    }

    #[test]
    fn test_render_empty_log() {
        assert_eq!(render_review_log(&[]), "");
    }
}
