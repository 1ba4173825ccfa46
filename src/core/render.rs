use std::borrow::Cow;
use std::fmt;

use tracing::debug;

use crate::core::config::FfmpegConfig;
use crate::core::container::ArgumentContainer;
use crate::core::error::{FfxError, Result};

const SHELL_SPECIAL: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '*', '?', '[', ']', '#', '~', '!', '{',
    '}', '\'',
];

/// A fully rendered, quoted command line (without the binary name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(String);

impl CommandLine {
    /// Wraps a hand-written line as-is. It is only split when the process is spawned.
    pub fn from_raw(line: impl Into<String>) -> Self {
        CommandLine(line.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the line back into argv tokens for process creation.
    pub fn to_args(&self) -> Result<Vec<String>> {
        shell_words::split(&self.0).map_err(|err| FfxError::construction(err.to_string()))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn quote_token(token: &str) -> Result<Cow<'_, str>> {
    if token.contains('"') {
        return Err(FfxError::construction(format!(
            "token contains a double quote: {token}"
        )));
    }
    if token.contains('\0') {
        return Err(FfxError::construction("token contains a NUL byte"));
    }

    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|ch| ch.is_whitespace() || SHELL_SPECIAL.contains(&ch));
    if !needs_quotes {
        return Ok(Cow::Borrowed(token));
    }

    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for ch in token.chars() {
        if matches!(ch, '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    Ok(Cow::Owned(quoted))
}

pub fn render_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<CommandLine> {
    if tokens.is_empty() {
        return Err(FfxError::construction("empty command line"));
    }
    let quoted = tokens
        .iter()
        .map(|token| quote_token(token.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(CommandLine(quoted.join(" ")))
}

/// Pure container-to-string conversion; no filesystem or process access.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    pub hide_banner: bool,
    pub reject_duplicate_kinds: bool,
}

impl Renderer {
    pub fn from_config(config: &FfmpegConfig) -> Self {
        Self {
            hide_banner: config.hide_banner,
            reject_duplicate_kinds: config.reject_duplicate_kinds,
        }
    }

    pub fn render(&self, container: &ArgumentContainer) -> Result<CommandLine> {
        let mut tokens = Vec::new();
        if self.hide_banner {
            tokens.push("-hide_banner".to_string());
        }
        tokens.extend(container.tokens(self.reject_duplicate_kinds)?);
        let line = render_tokens(&tokens)?;
        debug!(command = %line, "rendered command line");
        Ok(line)
    }
}
