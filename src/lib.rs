//! # obsanki
//!
//! Syncs flashcard notes written as plain-text markup inside an
//! Obsidian-style markdown vault with Anki, over the AnkiConnect local HTTP
//! API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Vault scan  │──▶│  Extraction  │──▶│ Reconcile   │
//! │ hash cache  │   │ regex notes  │   │ add/edit/del│
//! └─────────────┘   └──────────────┘   └──────┬──────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │ Rewrite  │       │   Anki   │
//!                    │ id marks │       │ Connect  │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! Changed files are found by diffing content hashes against the previous
//! run's cache. Notes are matched by configured regexes; each match is
//! classified off its embedded `<!--ID: n-->` marker, reconciled against the
//! ids Anki already knows, pushed to Anki in strict phase order, and freshly
//! assigned ids are written back into the source files.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`notetype`] | Note-variant registry: patterns + field recipes |
//! | [`note`] | Extraction, classification, heading hierarchy |
//! | [`field`] | Field values and text transforms |
//! | [`media`] | Embedded picture/audio references |
//! | [`reconcile`] | Add/edit/delete bucketing, media novelty |
//! | [`rewrite`] | Id-marker insertion/removal over file text |
//! | [`vault`] | Vault scanning, front matter, write-back |
//! | [`hashes`] | Per-vault content-hash cache |
//! | [`anki`] | AnkiConnect HTTP client |
//! | [`progress`] | Stderr progress reporting |
//! | [`sync`] | Pipeline orchestration |

pub mod anki;
pub mod config;
pub mod field;
pub mod hashes;
pub mod media;
pub mod note;
pub mod notetype;
pub mod progress;
pub mod reconcile;
pub mod rewrite;
pub mod sync;
pub mod vault;
