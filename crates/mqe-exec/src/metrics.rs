//! Tracing hooks for fetch fan-out.
//!
//! Compiles to nothing unless the `tracing` feature is on; exporters are
//! wired up by whatever binary embeds the engine.

#[cfg(feature = "tracing")]
pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "mqe", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "fetch");
    }
}

#[cfg(not(feature = "tracing"))]
pub fn emit_span(_event: &str, _key_values: &[(&str, String)]) {}
