use std::path::{Component, Path, PathBuf};

pub struct Utils {}

impl Utils {
    /// The deepest directory shared by every path in `paths`. Empty for a
    /// single path, so its name is shown in full.
    pub fn common_prefix(paths: &[PathBuf]) -> PathBuf {
        if paths.len() <= 1 {
            return PathBuf::new();
        }

        let mut prefix: Vec<Component> = match paths[0].parent() {
            Some(parent) => parent.components().collect(),
            None => return PathBuf::new(),
        };
        for path in &paths[1..] {
            let parent: Vec<Component> = path
                .parent()
                .map(|p| p.components().collect())
                .unwrap_or_default();
            let shared = prefix
                .iter()
                .zip(parent.iter())
                .take_while(|(a, b)| a == b)
                .count();
            prefix.truncate(shared);
        }
        prefix.iter().collect()
    }

    /// Display names with the common directory prefix removed.
    pub fn short_names(paths: &[PathBuf]) -> Vec<String> {
        let prefix = Self::common_prefix(paths);
        paths
            .iter()
            .map(|path| Self::short_name(path, &prefix))
            .collect()
    }

    fn short_name(path: &Path, prefix: &Path) -> String {
        if prefix.as_os_str().is_empty() {
            return path.to_string_lossy().into_owned();
        }
        path.strip_prefix(prefix)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}
