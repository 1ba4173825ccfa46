use std::path::{Path, PathBuf};

use crate::core::argument::{Argument, ArgumentKind, ArgumentValue, Output, Phase};
use crate::core::error::{FfxError, Result};

/// Ordered arguments for one invocation of the tool.
///
/// Insertion order is kept and matters: options inserted before an input apply to that
/// input. Only the output is moved, it always renders last. Two arguments of the same
/// kind are both rendered and the tool honours the later one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentContainer {
    arguments: Vec<Argument>,
}

impl ArgumentContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, argument: impl Into<Argument>) -> &mut Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn with(mut self, argument: impl Into<Argument>) -> Self {
        self.add(argument);
        self
    }

    /// First argument of payload type `T`.
    pub fn find<T: ArgumentValue>(&self) -> Option<&T> {
        self.arguments.iter().find_map(T::from_argument)
    }

    /// Last argument of payload type `T`, the one the tool will act on.
    pub fn effective<T: ArgumentValue>(&self) -> Option<&T> {
        self.arguments.iter().rev().find_map(T::from_argument)
    }

    pub fn find_kind(&self, kind: ArgumentKind) -> Option<&Argument> {
        self.arguments.iter().find(|argument| argument.kind() == kind)
    }

    pub fn contains(&self, kind: ArgumentKind) -> bool {
        self.find_kind(kind).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Argument> {
        self.arguments.iter()
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.find::<Output>().map(|output| output.0.as_path())
    }

    /// Points every output argument at `path`. Returns `false` when there is none.
    pub fn replace_output(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let mut replaced = false;
        for argument in &mut self.arguments {
            if let Argument::Output(output) = argument {
                output.0 = path.clone();
                replaced = true;
            }
        }
        replaced
    }

    /// Non-repeatable kinds present more than once, in first-seen order.
    pub fn duplicate_kinds(&self) -> Vec<ArgumentKind> {
        let mut seen = Vec::new();
        let mut duplicates = Vec::new();
        for kind in self.arguments.iter().map(Argument::kind) {
            if kind.is_repeatable() {
                continue;
            }
            if seen.contains(&kind) {
                if !duplicates.contains(&kind) {
                    duplicates.push(kind);
                }
            } else {
                seen.push(kind);
            }
        }
        duplicates
    }

    pub fn validate(&self, reject_duplicate_kinds: bool) -> Result<()> {
        if self.arguments.is_empty() {
            return Err(FfxError::construction("argument container is empty"));
        }

        let inputs = self
            .arguments
            .iter()
            .filter(|argument| argument.kind().phase() == Phase::Input)
            .count();
        if inputs == 0 {
            return Err(FfxError::construction("argument container has no input"));
        }

        let outputs = self
            .arguments
            .iter()
            .filter(|argument| argument.kind().phase() == Phase::Output)
            .count();
        match outputs {
            0 => return Err(FfxError::construction("argument container has no output")),
            1 => {}
            n => {
                return Err(FfxError::construction(format!(
                    "argument container has {n} outputs, expected one"
                )))
            }
        }

        if reject_duplicate_kinds {
            let duplicates = self.duplicate_kinds();
            if !duplicates.is_empty() {
                let names = duplicates
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(FfxError::construction(format!(
                    "duplicate argument kinds: {names}"
                )));
            }
        }

        Ok(())
    }

    /// Arguments in render order: insertion order with the output moved to the end.
    pub fn ordered(&self) -> impl Iterator<Item = &Argument> {
        let leading = self
            .arguments
            .iter()
            .filter(|argument| argument.kind().phase() != Phase::Output);
        let trailing = self
            .arguments
            .iter()
            .filter(|argument| argument.kind().phase() == Phase::Output);
        leading.chain(trailing)
    }

    /// Flat, unquoted token list. Validates structure first.
    pub fn tokens(&self, reject_duplicate_kinds: bool) -> Result<Vec<String>> {
        self.validate(reject_duplicate_kinds)?;
        let mut tokens = Vec::new();
        for argument in self.ordered() {
            tokens.extend(argument.tokens()?);
        }
        Ok(tokens)
    }
}

impl<'a> IntoIterator for &'a ArgumentContainer {
    type Item = &'a Argument;
    type IntoIter = std::slice::Iter<'a, Argument>;

    fn into_iter(self) -> Self::IntoIter {
        self.arguments.iter()
    }
}

impl IntoIterator for ArgumentContainer {
    type Item = Argument;
    type IntoIter = std::vec::IntoIter<Argument>;

    fn into_iter(self) -> Self::IntoIter {
        self.arguments.into_iter()
    }
}

impl FromIterator<Argument> for ArgumentContainer {
    fn from_iter<I: IntoIterator<Item = Argument>>(iter: I) -> Self {
        Self {
            arguments: iter.into_iter().collect(),
        }
    }
}

impl Extend<Argument> for ArgumentContainer {
    fn extend<I: IntoIterator<Item = Argument>>(&mut self, iter: I) {
        self.arguments.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::argument::{Scale, Seek, VideoCodec, VideoSize};

    fn basic() -> ArgumentContainer {
        ArgumentContainer::new()
            .with(Argument::input("in.mp4"))
            .with(VideoCodec::LibX264)
            .with(Argument::output("out.mp4"))
    }

    #[test]
    fn replace_output_retargets_in_place() {
        let mut container = ArgumentContainer::new()
            .with(Argument::input("in.mp4"))
            .with(Argument::output("out.mp4"));
        assert!(container.replace_output("/work/out.mp4"));
        assert_eq!(container.output_path(), Some(Path::new("/work/out.mp4")));
        assert_eq!(container.len(), 2);

        let mut no_output = ArgumentContainer::new().with(Argument::input("in.mp4"));
        assert!(!no_output.replace_output("/work/out.mp4"));
    }

    #[test]
    fn output_renders_last_regardless_of_insertion() {
        let container = ArgumentContainer::new()
            .with(Argument::output("out.mp4"))
            .with(Seek(Duration::from_secs(2)))
            .with(Argument::input("in.mp4"))
            .with(Scale::from_size(VideoSize::Ld).unwrap().unwrap());

        let tokens = container.tokens(false).unwrap();
        assert_eq!(
            tokens,
            vec!["-ss", "00:00:02.000", "-i", "in.mp4", "-vf", "scale=-2:360", "out.mp4"]
        );
    }

    #[test]
    fn find_returns_first_and_effective_returns_last() {
        let mut container = basic();
        container.add(VideoCodec::LibTheora);

        assert_eq!(container.find::<VideoCodec>(), Some(&VideoCodec::LibX264));
        assert_eq!(container.effective::<VideoCodec>(), Some(&VideoCodec::LibTheora));
        assert!(container.find::<Scale>().is_none());
        assert_eq!(container.output_path(), Some(Path::new("out.mp4")));
    }

    #[test]
    fn duplicates_render_unless_rejected() {
        let container = basic().with(VideoCodec::LibVpx);

        let tokens = container.tokens(false).unwrap();
        assert_eq!(
            tokens,
            vec!["-i", "in.mp4", "-c:v", "libx264", "-c:v", "libvpx", "out.mp4"]
        );

        assert_eq!(container.duplicate_kinds(), vec![ArgumentKind::VideoCodec]);
        let err = container.tokens(true).unwrap_err();
        assert!(err.to_string().contains("VideoCodec"));
    }

    #[test]
    fn repeated_inputs_are_not_duplicates() {
        let container = ArgumentContainer::new()
            .with(Argument::input("a.mp4"))
            .with(Argument::input("b.mp4"))
            .with(Argument::output("out.mp4"));
        assert!(container.duplicate_kinds().is_empty());
        assert!(container.validate(true).is_ok());
    }

    #[test]
    fn structural_errors_are_construction_errors() {
        let empty = ArgumentContainer::new();
        assert!(matches!(
            empty.validate(false),
            Err(FfxError::Construction { .. })
        ));

        let no_output = ArgumentContainer::new().with(Argument::input("in.mp4"));
        let err = no_output.tokens(false).unwrap_err();
        assert!(err.to_string().contains("no output"));

        let no_input = ArgumentContainer::new().with(Argument::output("out.mp4"));
        assert!(no_input.validate(false).is_err());

        let two_outputs = basic().with(Argument::output("again.mp4"));
        assert!(two_outputs.validate(false).is_err());
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let container = basic();
        let kinds: Vec<ArgumentKind> = container.iter().map(Argument::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ArgumentKind::Input,
                ArgumentKind::VideoCodec,
                ArgumentKind::Output
            ]
        );
    }
}
