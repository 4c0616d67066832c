//! Text-side processing: tokenizer conventions, token-word alignment, mask
//! resolution and fill-mask cleanup.

pub mod align;
pub mod convention;
pub mod mask;
pub mod predictions;

pub use align::{align, apply_alignment, WordAlignmentMap};
pub use convention::TokenizerConvention;
pub use mask::{replace_named_word, resolve, MaskStrategy, MaskTarget, SpanKind};
pub use predictions::{clean_predictions, TokenScore};
