//! # ircpush-core
//!
//! The text pipeline that sits between the line input and IRC delivery.
//!
//! - **Rule** - Compile declarative highlight rules into matchers and styles
//! - **RuleSet** - Ordered, immutable rule collections with atomic hot-swap
//! - **Highlight** - Apply a rule set to one line for one channel
//! - **Segment** - Truncate or split styled messages to a length limit
//! - **Targets** - Parse the optional leading channel list of a line
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  raw line   │────▶│   Targets   │────▶│  Highlight  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │   Segment   │──▶ chunks
//!                                         └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ircpush_core::{RuleSet, RuleSpec, SegmentPolicy};
//!
//! let rules = RuleSet::build(&[RuleSpec::word("error", "red").bold()]);
//! let styled = rules.apply_for("#ops", "disk error on sda");
//! assert_eq!(styled, "disk \x02\x0304error\x0F on sda");
//!
//! let chunks = SegmentPolicy::new(12, true).segment("one two three four");
//! assert_eq!(chunks, vec!["one two", "three four"]);
//! ```

pub mod highlight;
pub mod rule;
pub mod ruleset;
pub mod segment;
pub mod style;
pub mod targets;

pub use highlight::apply_for;
pub use rule::{compile, ChannelGlob, CompiledRule, RuleRejected, RuleSpec};
pub use ruleset::{Rejection, RuleSet, RuleSetHandle};
pub use segment::{segment, SegmentPolicy};
pub use targets::{ensure_channel_prefix, parse_targets, Targets};
