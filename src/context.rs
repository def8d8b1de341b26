use anyhow::Result;
use tracing::debug;

use crate::ir::ClassModel;

/// Classes of one run plus the class treated as the entry point.
#[derive(Debug)]
pub(crate) struct DeobfuscationContext {
    pub(crate) classes: Vec<ClassModel>,
    pub(crate) main_class: String,
}

impl DeobfuscationContext {
    /// Build a context, identifying the entry point unless one is given.
    pub(crate) fn new(classes: Vec<ClassModel>, main_class: Option<String>) -> Result<Self> {
        let main_class = match main_class {
            Some(name) => name,
            None => find_main_class(&classes)?,
        };
        debug!("main class: {}", main_class);
        Ok(Self {
            classes,
            main_class,
        })
    }
}

/// The obfuscator shortens every name but the entry point's to at most three
/// characters, so the first longer name in archive order is taken.
pub(crate) fn find_main_class(classes: &[ClassModel]) -> Result<String> {
    classes
        .iter()
        .map(|class| &class.name)
        .find(|name| name.encode_utf16().count() > 3)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no class name longer than 3 characters; pass --main-class"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(names: &[&str]) -> Vec<ClassModel> {
        names
            .iter()
            .map(|name| ClassModel::new(*name, Some("java/lang/Object".to_string())))
            .collect()
    }

    #[test]
    fn first_long_name_wins() {
        let classes = classes(&["a", "bc", "OrbDefence", "Another"]);

        assert_eq!("OrbDefence", find_main_class(&classes).expect("main class"));
    }

    #[test]
    fn three_characters_do_not_qualify() {
        let classes = classes(&["abc", "zz"]);

        assert!(find_main_class(&classes).is_err());
        assert!(DeobfuscationContext::new(classes, None).is_err());
    }

    #[test]
    fn name_length_counts_utf16_units() {
        let classes = classes(&["ab\u{e9}", "a\u{1F600}b"]);

        assert_eq!("a\u{1F600}b", find_main_class(&classes).expect("main class"));
    }

    #[test]
    fn explicit_main_class_skips_the_heuristic() {
        let context = DeobfuscationContext::new(classes(&["a"]), Some("a".to_string()))
            .expect("context");

        assert_eq!("a", context.main_class);
    }
}
