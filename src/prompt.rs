//! Operator prompts.
//!
//! Every question the run can ask goes through `Prompter`, so the same flow
//! runs interactively, fully unattended (`--yes`), or against scripted
//! answers in tests.

use anyhow::Result;
use dialoguer::{Confirm, Input, Select};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Source of answers to run-time questions
pub trait Prompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    /// Index of the chosen item
    fn select(&self, question: &str, items: &[String], default: usize) -> Result<usize>;

    fn input(&self, question: &str) -> Result<String>;
}

/// Asks on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()?)
    }

    fn select(&self, question: &str, items: &[String], default: usize) -> Result<usize> {
        Ok(Select::new()
            .with_prompt(question)
            .items(items)
            .default(default)
            .interact()?)
    }

    fn input(&self, question: &str) -> Result<String> {
        Ok(Input::<String>::new().with_prompt(question).interact_text()?)
    }
}

/// Answers yes to every confirmation and takes every default.
///
/// Free-text questions have no default and are refused.
#[derive(Debug, Default)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        log::debug!("Assuming yes: {}", question);
        Ok(true)
    }

    fn select(&self, question: &str, items: &[String], default: usize) -> Result<usize> {
        if default >= items.len() {
            anyhow::bail!("no default answer for '{}'", question);
        }
        log::debug!("Assuming '{}' for: {}", items[default], question);
        Ok(default)
    }

    fn input(&self, question: &str) -> Result<String> {
        anyhow::bail!("'{}' needs an answer; set it in the config file", question)
    }
}

/// One pre-recorded answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Confirm(bool),
    Select(usize),
    Input(String),
}

/// Replays answers in order; running out or a type mismatch is an error
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<Answer>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    fn next(&self, question: &str) -> Result<Answer> {
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted answer for '{}'", question))
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        match self.next(question)? {
            Answer::Confirm(yes) => Ok(yes),
            other => anyhow::bail!("expected a confirmation for '{}', got {:?}", question, other),
        }
    }

    fn select(&self, question: &str, items: &[String], _default: usize) -> Result<usize> {
        match self.next(question)? {
            Answer::Select(idx) if idx < items.len() => Ok(idx),
            other => anyhow::bail!("bad selection for '{}': {:?}", question, other),
        }
    }

    fn input(&self, question: &str) -> Result<String> {
        match self.next(question)? {
            Answer::Input(text) => Ok(text),
            other => anyhow::bail!("expected text for '{}', got {:?}", question, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_yes_takes_defaults() {
        let p = AssumeYes;
        assert!(p.confirm("Proceed?", false).unwrap());
        let items = vec!["keep".to_string(), "archive".to_string()];
        assert_eq!(p.select("Backups?", &items, 1).unwrap(), 1);
        assert!(p.select("Backups?", &items, 5).is_err());
        assert!(p.input("Group name").is_err());
    }

    #[test]
    fn test_scripted_answers_in_order() {
        let p = ScriptedPrompter::new([
            Answer::Select(1),
            Answer::Input("blackarch-webapp".into()),
            Answer::Confirm(false),
        ]);
        let items = vec!["all".to_string(), "group".to_string()];
        assert_eq!(p.select("Which?", &items, 0).unwrap(), 1);
        assert_eq!(p.input("Group").unwrap(), "blackarch-webapp");
        assert!(!p.confirm("Proceed?", true).unwrap());
        assert_eq!(p.remaining(), 0);
        assert!(p.confirm("Again?", true).is_err());
    }

    #[test]
    fn test_scripted_type_mismatch() {
        let p = ScriptedPrompter::new([Answer::Confirm(true)]);
        assert!(p.input("Group").is_err());
    }
}
