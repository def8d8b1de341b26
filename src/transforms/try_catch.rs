use tracing::debug;

use crate::context::DeobfuscationContext;
use crate::transforms::{Result, Transformer};

const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";

/// Drops the `RuntimeException` handlers the obfuscator wraps around code.
/// The handler code itself stays in place and becomes unreachable.
pub(crate) struct SpuriousHandlerRemover;

impl Transformer for SpuriousHandlerRemover {
    fn name(&self) -> &'static str {
        "SpuriousHandlerRemover"
    }

    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize> {
        let mut changed = 0;
        for class in &mut context.classes {
            for method in &mut class.methods {
                let before = method.exception_ranges.len();
                method
                    .exception_ranges
                    .retain(|range| range.catch_type.as_deref() != Some(RUNTIME_EXCEPTION));
                let removed = before - method.exception_ranges.len();
                if removed > 0 {
                    debug!(
                        "removed {} handlers from {}",
                        removed,
                        method.display_name(&class.name)
                    );
                }
                changed += removed;
            }
        }
        Ok(changed)
    }
}
