use std::time::Instant;

use thiserror::Error;
use tracing::info;

use crate::context::DeobfuscationContext;
use crate::operand::OperandError;

pub(crate) mod bitshift;
pub(crate) mod if_jump;
pub(crate) mod opaque_predicate;
pub(crate) mod string_decryptor;
pub(crate) mod string_inliner;
pub(crate) mod try_catch;

/// Error raised by a pass. Idioms that are simply absent are skipped, so
/// an error aborts the run.
#[derive(Debug, Error)]
pub(crate) enum Error {
    /// An instruction matched as an integer push has another encoding.
    #[error(transparent)]
    Operand(#[from] OperandError),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// One rewrite pass over every class of the context.
pub(crate) trait Transformer {
    fn name(&self) -> &'static str;
    /// Rewrite the classes in place and return the number of sites changed.
    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize>;
}

/// Passes in the order they must run: strings are decrypted before they are
/// inlined, and jumps are collapsed before opaque predicates are stripped.
pub(crate) fn default_transformers() -> Vec<Box<dyn Transformer>> {
    vec![
        Box::new(string_decryptor::StringDecryptor),
        Box::new(string_inliner::StringInliner),
        Box::new(bitshift::BitshiftNormalizer),
        Box::new(try_catch::SpuriousHandlerRemover),
        Box::new(if_jump::RedundantJumpCollapser),
        Box::new(opaque_predicate::OpaquePredicateRemover),
    ]
}

/// Run each pass once, in order. Returns the total number of changed sites.
pub(crate) fn run_transformers(
    context: &mut DeobfuscationContext,
    transformers: &[Box<dyn Transformer>],
) -> Result<usize> {
    let mut total = 0;
    for transformer in transformers {
        let started_at = Instant::now();
        let changed = transformer.process(context)?;
        info!(
            "{:>24}: {} sites in {}ms",
            transformer.name(),
            changed,
            started_at.elapsed().as_millis()
        );
        total += changed;
    }
    Ok(total)
}
