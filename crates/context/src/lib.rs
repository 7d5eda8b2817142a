//! Context shaping: packing, pruning, and rolling summaries.
//!
//! Three pure transformations over an owned history slice. None of them
//! mutates its input; tool-result edits are copy-on-write so callers can
//! keep sharing the untouched messages.

mod packer;
mod pruner;
mod summarizer;

pub use packer::{
    ContextPacker, PackDiagnostics, PackItem, PackItemKind, PackItemReason, PackedPrompt,
};
pub use pruner::{ContextPruner, PrunePolicy};
pub use summarizer::{Summarizer, SummaryProvider};
