//! Rules manager.
//!
//! Holds the base rules, the edits received from remote configuration and the
//! compiled result. The compiled [`Ruleset`] lives behind an `ArcSwap`: WAF
//! readers load it without locking and keep their snapshot for as long as an
//! evaluation runs, while updates build a new one and swap it in.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::rules::fragment::RulesFragment;
use crate::rules::Result;

/// A change delivered by remote configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesUpdate {
    /// Replaces the base rules (`ASM_DD`).
    Base { path: String, data: Vec<u8> },
    /// Goes back to the rules the manager was created with.
    ResetBase,
    /// Adds or replaces the edit stored under `path` (`ASM`, `ASM_DATA`).
    Edit { path: String, data: Vec<u8> },
    RemoveEdit { path: String },
}

/// A compiled, immutable rules document.
#[derive(Debug, Clone, PartialEq)]
pub struct Ruleset {
    fragment: RulesFragment,
    revision: u64,
    base_path: Option<String>,
}

impl Ruleset {
    pub fn fragment(&self) -> &RulesFragment {
        &self.fragment
    }

    /// Number of swaps since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Remote-config path of the base rules, `None` for the initial rules.
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.fragment.rules_version()
    }

    pub fn rules_count(&self) -> usize {
        self.fragment.rules.len() + self.fragment.custom_rules.len()
    }

    /// Serialized document for the WAF engine.
    pub fn raw(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fragment)?)
    }
}

#[derive(Debug)]
struct EditState {
    initial: RulesFragment,
    base: RulesFragment,
    base_path: Option<String>,
    edits: BTreeMap<String, RulesFragment>,
    revision: u64,
}

impl EditState {
    fn compile(&self) -> Ruleset {
        let mut fragment = self.base.clone();
        for edit in self.edits.values() {
            fragment.merge(edit);
        }
        Ruleset {
            fragment,
            revision: self.revision,
            base_path: self.base_path.clone(),
        }
    }
}

enum Parsed {
    Base(String, RulesFragment),
    ResetBase,
    Edit(String, RulesFragment),
    RemoveEdit(String),
}

/// Owner of the active rules.
#[derive(Debug)]
pub struct RulesManager {
    state: Mutex<EditState>,
    latest: ArcSwap<Ruleset>,
}

impl RulesManager {
    /// Builds a manager from a complete rules document.
    pub fn new(rules: &[u8]) -> Result<Self> {
        let base = match RulesFragment::parse_base(rules) {
            Ok(base) => base,
            Err(e) => {
                tracing::error!(error = %e, "appsec: cannot create the rules manager from the specified rules");
                return Err(e);
            }
        };

        let state = EditState {
            initial: base.clone(),
            base,
            base_path: None,
            edits: BTreeMap::new(),
            revision: 0,
        };
        let latest = ArcSwap::from_pointee(state.compile());

        Ok(Self {
            state: Mutex::new(state),
            latest,
        })
    }

    /// Current compiled rules.
    pub fn latest(&self) -> Arc<Ruleset> {
        self.latest.load_full()
    }

    /// Paths of the edits currently applied.
    pub fn edit_paths(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.edits.keys().cloned().collect()
    }

    /// Applies a batch of updates and swaps in the recompiled rules.
    ///
    /// Every fragment is parsed before anything changes; on error the current
    /// rules stay active. Returns the new revision.
    pub fn apply<I>(&self, updates: I) -> Result<u64>
    where
        I: IntoIterator<Item = RulesUpdate>,
    {
        let parsed = updates
            .into_iter()
            .map(|update| -> Result<Parsed> {
                Ok(match update {
                    RulesUpdate::Base { path, data } => {
                        Parsed::Base(path, RulesFragment::parse_base(&data)?)
                    }
                    RulesUpdate::ResetBase => Parsed::ResetBase,
                    RulesUpdate::Edit { path, data } => {
                        Parsed::Edit(path, RulesFragment::parse(&data)?)
                    }
                    RulesUpdate::RemoveEdit { path } => Parsed::RemoveEdit(path),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for update in parsed {
            match update {
                Parsed::Base(path, fragment) => {
                    state.base = fragment;
                    state.base_path = Some(path);
                }
                Parsed::ResetBase => {
                    state.base = state.initial.clone();
                    state.base_path = None;
                }
                Parsed::Edit(path, fragment) => {
                    state.edits.insert(path, fragment);
                }
                Parsed::RemoveEdit(path) => {
                    state.edits.remove(&path);
                }
            }
        }
        state.revision += 1;

        let ruleset = state.compile();
        let revision = ruleset.revision;
        self.latest.store(Arc::new(ruleset));
        Ok(revision)
    }
}
