//! Subcommand implementations. Each returns the stable result code; zero is
//! success.

pub mod check;
pub mod repair;
pub mod run;

/// Renders an error with its full source chain.
pub(crate) fn render_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(&format!(": {inner}"));
        source = inner.source();
    }
    text
}
