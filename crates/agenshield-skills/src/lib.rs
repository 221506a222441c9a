//! Skill lifecycle: validated file bundles, SHA-256 versioning, directory
//! watching, quarantine, a vulnerability-analysis hook, and install
//! orchestration.
//!
//! A skill is a directory with a `SKILL.md` plus scripts, addressed by slug.
//! Discovery hashes the sorted file set; the version store decides whether a
//! change is an install, update, or removal; untrusted skills pass the
//! analysis hook (or land in quarantine) before materialisation.

pub mod analysis;
pub mod installer;
pub mod model;
pub mod quarantine;
pub mod version_store;
pub mod watcher;

pub use model::{SkillFile, SkillSpec};
pub use version_store::VersionStore;
pub use watcher::{SkillChange, SkillWatcher};
