use anyhow::{Context, Result};
use std::path::Path;

/// Class names indexed by model output position
#[derive(Clone, Debug, Default)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels from {}", path.display()))?;

        let labels = Self::parse(&text);
        tracing::info!("Loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// One label per line. A leading WordNet id (`n01440764 tench`) is
    /// stripped so only the readable name remains.
    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .map(|line| strip_synset_id(line.trim()).to_string())
            .collect();
        Self { names }
    }

    pub fn name(&self, index: usize) -> String {
        match self.names.get(index) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("class_{index}"),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

fn strip_synset_id(line: &str) -> &str {
    match line.split_once(' ') {
        Some((id, rest))
            if id.len() == 9
                && id.starts_with('n')
                && id[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            rest.trim_start()
        }
        _ => line,
    }
}
