//! Trigger evaluation.

use forge_core::run::{EventKind, TriggerEvent};
use regex::Regex;
use std::sync::LazyLock;

/// Whether and how a run fires for an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDecision {
    pub fire: bool,
    pub release_eligible: bool,
}

impl TriggerDecision {
    pub const NO_RUN: TriggerDecision = TriggerDecision {
        fire: false,
        release_eligible: false,
    };
}

static RELEASE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^refs/tags/v\d+\.\d+\.\d+$").expect("release tag pattern")
});

/// Decides whether a run fires. Pure: the decision is re-derivable from the
/// event's kind and ref string alone.
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, event: &TriggerEvent) -> TriggerDecision {
        match event.kind {
            // Pull requests always fire the non-release stages.
            EventKind::PullRequest => TriggerDecision {
                fire: true,
                release_eligible: false,
            },
            // Pushes only fire for semantic-version tags, which are also
            // what makes the run release-eligible.
            EventKind::Push => {
                let is_release_tag = RELEASE_TAG.is_match(&event.git_ref);
                TriggerDecision {
                    fire: is_release_tag,
                    release_eligible: is_release_tag,
                }
            }
        }
    }
}

impl Default for TriggerEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
