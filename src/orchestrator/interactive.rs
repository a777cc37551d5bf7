//! Interactive review: per-document curation and after-batch merge confirmation
//!
//! `InteractiveIo` is the seam that keeps this testable: the real terminal
//! implementation reads stdin/writes stdout, tests substitute a scripted one.

use crate::extraction::{DuplicateMarker, ExtractedEntity};
use std::io::{self, BufRead, Write};

/// Commands a user can issue during per-document review.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewCommand {
    Delete(usize),
    Edit(usize, String),
    Merge(usize, usize),
    Done,
    /// Unrecognized input; re-prompt without changing anything.
    Invalid(String),
}

impl ReviewCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("delete") => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
                Some(n) => ReviewCommand::Delete(n),
                None => ReviewCommand::Invalid(line.to_string()),
            },
            Some("merge") => {
                let a = parts.next().and_then(|n| n.parse::<usize>().ok());
                let b = parts.next().and_then(|n| n.parse::<usize>().ok());
                match (a, b) {
                    (Some(a), Some(b)) => ReviewCommand::Merge(a, b),
                    _ => ReviewCommand::Invalid(line.to_string()),
                }
            }
            Some("edit") => {
                let n = parts.next().and_then(|n| n.parse::<usize>().ok());
                let rest: Vec<&str> = parts.collect();
                match n {
                    Some(n) if !rest.is_empty() => ReviewCommand::Edit(n, rest.join(" ")),
                    _ => ReviewCommand::Invalid(line.to_string()),
                }
            }
            Some("done") => ReviewCommand::Done,
            _ => ReviewCommand::Invalid(line.to_string()),
        }
    }
}

/// The terminal seam: a line source and a line sink, so the real binary can
/// use stdin/stdout and tests can script both.
pub trait InteractiveIo {
    fn prompt(&mut self, message: &str) -> Option<String>;
    fn tell(&mut self, message: &str);
}

pub struct TerminalIo {
    stdin: io::Stdin,
}

impl Default for TerminalIo {
    fn default() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl InteractiveIo for TerminalIo {
    fn prompt(&mut self, message: &str) -> Option<String> {
        print!("{message}");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match self.stdin.lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
            Err(_) => None,
        }
    }

    fn tell(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Run the per-document interactive review loop over `entities` in
/// place. Index slots are never removed: `delete` tombstones, `merge` sets
/// `DuplicateOfBatch`, `edit` rewrites `name`/`normalized_name`. Returns once
/// the user enters `done` or the io source is exhausted (EOF treated as
/// `done`, matching a piped/non-interactive invocation).
pub fn review_entities(io: &mut dyn InteractiveIo, entities: &mut [ExtractedEntity]) {
    loop {
        let listing = format_listing(entities);
        io.tell(&listing);
        let Some(line) = io.prompt("review> ") else {
            return;
        };
        match ReviewCommand::parse(&line) {
            ReviewCommand::Done => return,
            ReviewCommand::Delete(n) => match entities.get_mut(n) {
                Some(e) => e.duplicate = DuplicateMarker::Tombstone,
                None => io.tell(&format!("no entity at index {n}")),
            },
            ReviewCommand::Edit(n, new_name) => match entities.get_mut(n) {
                Some(e) => {
                    e.name = new_name;
                    e.normalized_name = crate::canonical::normalize_basic(&e.name);
                }
                None => io.tell(&format!("no entity at index {n}")),
            },
            ReviewCommand::Merge(a, b) => {
                if a == b {
                    io.tell("cannot merge an entity with itself");
                    continue;
                }
                let same_type = match (entities.get(a), entities.get(b)) {
                    (Some(ea), Some(eb)) => ea.type_id == eb.type_id,
                    _ => {
                        io.tell("index out of range");
                        continue;
                    }
                };
                if !same_type {
                    io.tell("merge N M requires the same entity_type");
                    continue;
                }
                if let Some(e) = entities.get_mut(a) {
                    e.duplicate = DuplicateMarker::DuplicateOfBatch(b);
                }
            }
            ReviewCommand::Invalid(raw) => {
                io.tell(&format!("unrecognized command: {raw}"));
            }
        }
    }
}

fn format_listing(entities: &[ExtractedEntity]) -> String {
    let mut out = String::new();
    for (i, e) in entities.iter().enumerate() {
        let status = match &e.duplicate {
            DuplicateMarker::Tombstone => " [deleted]",
            DuplicateMarker::DuplicateOfBatch(_) | DuplicateMarker::DuplicateOfGraph(_) => " [duplicate]",
            DuplicateMarker::None => "",
        };
        out.push_str(&format!("{i}: [{}] {}{}\n", e.type_id, e.name, status));
    }
    out
}

/// One candidate pair surfaced by the global fuzzy-dedup after-batch hook,
/// for interactive confirmation.
pub struct MergeCandidate {
    pub left_id: String,
    pub left_name: String,
    pub right_id: String,
    pub right_name: String,
    pub score: f32,
}

/// Outcome of presenting one candidate pair to the user: which id should
/// survive as canonical, or a skip.
pub enum MergeDecision {
    Canonical(String),
    Skip,
}

/// Present one candidate pair and return the user's canonical choice.
/// Unrecognized input or EOF is treated as skip — a cautious default for an
/// operation that deletes a node.
pub fn confirm_merge(io: &mut dyn InteractiveIo, candidate: &MergeCandidate) -> MergeDecision {
    io.tell(&format!(
        "possible duplicate (score {:.2}): [1] {} ({})  vs  [2] {} ({})",
        candidate.score, candidate.left_name, candidate.left_id, candidate.right_name, candidate.right_id
    ));
    match io.prompt("keep which as canonical? [1/2/skip] ") {
        Some(ref s) if s.trim() == "1" => MergeDecision::Canonical(candidate.left_id.clone()),
        Some(ref s) if s.trim() == "2" => MergeDecision::Canonical(candidate.right_id.clone()),
        _ => MergeDecision::Skip,
    }
}
