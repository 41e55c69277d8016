// Copyright 2023 ToyCC contributors

//! DFA engine for lexical recognition.
//!
//! A DFA is loaded from the serialized `.tcdf` description: whitespace
//! separated commands terminated by `eof`.
//!
//! ```text
//! def <id> <tag>           tag in { normal, final, start }
//! trans <from> <to> <ascii>
//! eof
//! ```
//!
//! States refer to each other by id; the `Dfa` owns every state.

use crate::scan::Scanner;
use std::collections::BTreeMap;
use std::fmt;

pub type StateId = i32;

/// Classification of a state. The tags are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTag {
    Normal,
    Final,
    Start,
}

#[derive(Debug)]
pub struct DfaState {
    pub id: StateId,
    pub tag: StateTag,
    transitions: BTreeMap<u8, StateId>,
}

impl DfaState {
    pub fn is_final(&self) -> bool {
        self.tag == StateTag::Final
    }

    pub fn is_initial(&self) -> bool {
        self.tag == StateTag::Start
    }

    pub fn next_state(&self, byte: u8) -> Option<StateId> {
        self.transitions.get(&byte).copied()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DfaError {
    DuplicateState(StateId),
    DuplicateStart(StateId),
    UnknownState(StateId),
    BadTag(String),
    BadInteger(String),
    BadDirective(String),
    MissingStart,
    UnexpectedEnd,
}

impl fmt::Display for DfaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DfaError::DuplicateState(id) => write!(f, "state {} defined twice", id),
            DfaError::DuplicateStart(id) => write!(f, "second start state {}", id),
            DfaError::UnknownState(id) => write!(f, "transition names unknown state {}", id),
            DfaError::BadTag(tag) => write!(f, "bad state tag \"{}\"", tag),
            DfaError::BadInteger(text) => write!(f, "expected an integer, got \"{}\"", text),
            DfaError::BadDirective(text) => write!(f, "cannot parse directive \"{}\"", text),
            DfaError::MissingStart => write!(f, "no start state defined"),
            DfaError::UnexpectedEnd => write!(f, "description ended before \"eof\""),
        }
    }
}

impl std::error::Error for DfaError {}

#[derive(Debug, Default)]
pub struct Dfa {
    states: Vec<DfaState>,
    index: BTreeMap<StateId, usize>,
    entry: Option<usize>,
}

impl Dfa {
    pub fn new() -> Self {
        Dfa::default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, id: StateId) -> Option<&DfaState> {
        self.index.get(&id).map(|&idx| &self.states[idx])
    }

    pub fn entry_state(&self) -> Option<&DfaState> {
        self.entry.map(|idx| &self.states[idx])
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.index.clear();
        self.entry = None;
    }

    /// Build the automaton from a `.tcdf` description. Any failure leaves the
    /// DFA empty.
    pub fn build(&mut self, description: &str) -> Result<(), DfaError> {
        self.clear();
        let result = self.build_inner(description);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn build_inner(&mut self, description: &str) -> Result<(), DfaError> {
        let mut scanner = Scanner::new(description);
        loop {
            let directive = scanner.next_token().ok_or(DfaError::UnexpectedEnd)?;
            match directive {
                "def" => {
                    let id = next_int(&mut scanner)?;
                    let tag = match scanner.next_token().ok_or(DfaError::UnexpectedEnd)? {
                        "normal" => StateTag::Normal,
                        "final" => StateTag::Final,
                        "start" => StateTag::Start,
                        other => return Err(DfaError::BadTag(other.to_string())),
                    };
                    if self.index.contains_key(&id) {
                        return Err(DfaError::DuplicateState(id));
                    }
                    if tag == StateTag::Start {
                        if self.entry.is_some() {
                            return Err(DfaError::DuplicateStart(id));
                        }
                        self.entry = Some(self.states.len());
                    }
                    self.index.insert(id, self.states.len());
                    self.states.push(DfaState {
                        id,
                        tag,
                        transitions: BTreeMap::new(),
                    });
                }
                "trans" => {
                    let from = next_int(&mut scanner)?;
                    let to = next_int(&mut scanner)?;
                    let ascii = next_int(&mut scanner)?;
                    if !self.index.contains_key(&to) {
                        return Err(DfaError::UnknownState(to));
                    }
                    let from_idx = *self
                        .index
                        .get(&from)
                        .ok_or(DfaError::UnknownState(from))?;
                    if ascii < 0 || ascii > 255 {
                        return Err(DfaError::BadInteger(ascii.to_string()));
                    }
                    self.states[from_idx].transitions.insert(ascii as u8, to);
                }
                "eof" => break,
                other => return Err(DfaError::BadDirective(other.to_string())),
            }
        }
        if self.entry.is_none() {
            return Err(DfaError::MissingStart);
        }
        Ok(())
    }

    /// Follow transitions greedily from the start state over `bytes`,
    /// beginning at `pos`. `\r` bytes are swallowed without a state change;
    /// bytes >= 128 are consumed as an atomic 2-byte sequence when a
    /// transition exists on the first byte. Returns the state the automaton
    /// halted in and the position one past the last consumed byte, or `None`
    /// when the DFA has not been built.
    pub fn recognize(&self, bytes: &[u8], mut pos: usize) -> Option<(&DfaState, usize)> {
        let mut current = self.entry?;
        while pos < bytes.len() {
            let byte = bytes[pos];
            if byte == b'\r' {
                pos += 1;
                continue;
            }
            let next = match self.states[current].transitions.get(&byte) {
                Some(&next_id) => *self.index.get(&next_id).expect("ids checked at build"),
                None => break,
            };
            pos += if byte >= 128 { 2 } else { 1 };
            if pos > bytes.len() {
                pos = bytes.len();
            }
            current = next;
        }
        Some((&self.states[current], pos))
    }
}

fn next_int(scanner: &mut Scanner) -> Result<StateId, DfaError> {
    let token = scanner.next_token().ok_or(DfaError::UnexpectedEnd)?;
    token
        .parse::<StateId>()
        .map_err(|_| DfaError::BadInteger(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // start --a--> 1(final) --b--> 2(final)
    const TWO_STEP: &str = "\
        def 0 start\n\
        def 1 final\n\
        def 2 final\n\
        trans 0 1 97\n\
        trans 1 2 98\n\
        eof\n";

    #[test]
    fn builds_and_recognizes_longest_match() {
        let mut dfa = Dfa::new();
        dfa.build(TWO_STEP).unwrap();
        assert_eq!(dfa.state_count(), 3);

        let (state, end) = dfa.recognize(b"ab!", 0).unwrap();
        assert_eq!(state.id, 2);
        assert!(state.is_final());
        assert_eq!(end, 2);
    }

    #[test]
    fn halts_in_non_final_state_without_consuming_the_bad_byte() {
        let mut dfa = Dfa::new();
        dfa.build(TWO_STEP).unwrap();
        let (state, end) = dfa.recognize(b"zz", 0).unwrap();
        assert_eq!(state.id, 0);
        assert_eq!(end, 0);
    }

    #[test]
    fn carriage_returns_are_swallowed() {
        let mut dfa = Dfa::new();
        dfa.build(TWO_STEP).unwrap();
        let (state, end) = dfa.recognize(b"a\rb", 0).unwrap();
        assert_eq!(state.id, 2);
        assert_eq!(end, 3);
    }

    #[test]
    fn duplicate_definition_clears_the_dfa() {
        let mut dfa = Dfa::new();
        let err = dfa
            .build("def 0 start\ndef 0 final\neof\n")
            .unwrap_err();
        assert_eq!(err, DfaError::DuplicateState(0));
        assert!(dfa.is_empty());
    }

    #[test]
    fn transition_to_unknown_state_is_rejected() {
        let mut dfa = Dfa::new();
        let err = dfa
            .build("def 0 start\ntrans 0 7 97\neof\n")
            .unwrap_err();
        assert_eq!(err, DfaError::UnknownState(7));
        assert!(dfa.is_empty());
    }

    #[test]
    fn malformed_tag_and_missing_eof_are_rejected() {
        let mut dfa = Dfa::new();
        assert_eq!(
            dfa.build("def 0 begin\neof\n").unwrap_err(),
            DfaError::BadTag("begin".to_string())
        );
        assert_eq!(
            dfa.build("def 0 start\n").unwrap_err(),
            DfaError::UnexpectedEnd
        );
        assert!(dfa.is_empty());
    }

    #[test]
    fn only_one_start_state_is_allowed() {
        let mut dfa = Dfa::new();
        let err = dfa
            .build("def 0 start\ndef 1 start\neof\n")
            .unwrap_err();
        assert_eq!(err, DfaError::DuplicateStart(1));
    }
}
