/*!
Interpretation of PDF content streams into a renderer-agnostic operator list.

The entry point is the [`Evaluator`], which consumes a content stream and its
resource dictionary and appends drawing instructions to an [`OperatorList`],
a flat instruction tape any rendering backend can consume. Interpretation is
cooperatively scheduled: [`Evaluator::process`] runs until the stream ends, a
time budget expires or the evaluation is cancelled, and is simply called
again to resume.

Alongside the evaluator live the pieces it drives:

- the [`function`] engine for PDF function objects (sampled, exponential,
  stitching and PostScript calculator functions);
- [`font`] resolution, which deduplicates font dictionaries, repairs
  embedded font programs through `carta-font` and derives the
  char-code-to-glyph and char-code-to-Unicode tables;
- the [`text`] extractor, a sibling interpreter that produces positioned
  text runs instead of paint instructions.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub mod error;
pub mod evaluator;
pub mod font;
pub mod function;
pub mod operator_list;
pub mod ops;
pub mod preprocessor;
pub mod state;
pub mod text;
mod util;

pub use error::EvalError;
pub use evaluator::{EvalStatus, Evaluator};
pub use font::Font;
pub use operator_list::{Operand, OperatorList};
pub use ops::OpCode;

use font::FontCache;

/// A callback for structured diagnostics the host may surface or count.
///
/// Never used for control flow.
pub type WarningSinkFn = Arc<dyn Fn(UnsupportedFeature) + Send + Sync>;

/// The kind of construct a degradation notice refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnsupportedFeature {
    /// A font failed to resolve or repair.
    Font,
    /// An image was rejected or failed to decode.
    Image,
    /// Anything else (blend modes, patterns, shading, unknown constructs).
    General,
}

/// Settings that apply to a whole document's evaluations.
#[derive(Clone)]
pub struct EvalSettings {
    /// Degrade and continue on malformed constructs instead of failing the
    /// whole evaluation. On by default, matching viewing behavior; turn off
    /// for conformance testing.
    pub ignore_errors: bool,
    /// Reject images with more pixels than this. -1 means unbounded.
    pub max_image_size: i64,
    /// Force glyph-path rendering instead of font-face text.
    pub disable_font_face: bool,
    /// Embed binary payloads as data URIs instead of transferring them.
    pub force_data_schema: bool,
    /// Whether JPEG decoding may be delegated to a native decoder.
    pub native_image_decoder_support: NativeImageDecoding,
    /// Permit compiling PostScript functions; when false the interpreted VM
    /// is always used.
    pub is_eval_supported: bool,
    /// Receives degradation notices.
    pub warning_sink: WarningSinkFn,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            max_image_size: -1,
            disable_font_face: false,
            force_data_schema: false,
            native_image_decoder_support: NativeImageDecoding::Decode,
            is_eval_supported: true,
            warning_sink: Arc::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for EvalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalSettings")
            .field("ignore_errors", &self.ignore_errors)
            .field("max_image_size", &self.max_image_size)
            .field("disable_font_face", &self.disable_font_face)
            .field("force_data_schema", &self.force_data_schema)
            .field(
                "native_image_decoder_support",
                &self.native_image_decoder_support,
            )
            .field("is_eval_supported", &self.is_eval_supported)
            .finish_non_exhaustive()
    }
}

/// Whether image decoding may take a native fast path.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NativeImageDecoding {
    None,
    #[default]
    Decode,
}

/// A cooperative cancellation signal, checked at the top of every
/// scheduling slice.
///
/// Cancelled evaluations finish with [`EvalStatus::Cancelled`], never with
/// an error.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Document-level shared state: the font caches, the side-channel delivery
/// guard and the id generator.
///
/// Shared by every evaluation of the same document. Mutation only happens
/// from the resolution paths under the single-threaded cooperative
/// scheduling discipline.
pub struct DocumentContext {
    pub settings: EvalSettings,
    pub(crate) fonts: FontCache,
    id_counter: AtomicU64,
    delivered: std::sync::Mutex<rustc_hash::FxHashSet<String>>,
}

impl DocumentContext {
    pub fn new(settings: EvalSettings) -> Self {
        Self {
            settings,
            fonts: FontCache::default(),
            id_counter: AtomicU64::new(1),
            delivered: std::sync::Mutex::new(rustc_hash::FxHashSet::default()),
        }
    }

    /// A fresh document-unique id with the given prefix.
    pub(crate) fn next_id(&self, prefix: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed);

        format!("{prefix}{n}")
    }

    /// Whether an out-of-band object with this id still needs delivery.
    ///
    /// Returns true exactly once per id.
    pub fn claim_delivery(&self, id: &str) -> bool {
        self.delivered
            .lock()
            .map(|mut set| set.insert(id.to_string()))
            .unwrap_or(false)
    }

    pub(crate) fn warn_unsupported(&self, kind: UnsupportedFeature) {
        (self.settings.warning_sink)(kind);
    }
}

impl Default for DocumentContext {
    fn default() -> Self {
        Self::new(EvalSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_guard_claims_once() {
        let ctx = DocumentContext::default();

        assert!(ctx.claim_delivery("img1"));
        assert!(!ctx.claim_delivery("img1"));
        assert!(ctx.claim_delivery("img2"));
    }

    #[test]
    fn cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();

        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
