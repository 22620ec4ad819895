//! # Feature: Example Corpus
//!
//! Persists example messages as newline-delimited `.txt` files in the data
//! directory (one partition per file) and serves balanced samples to the
//! generation engine so no single source file dominates the prompt.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Balanced per-file sampling with fill step
//! - 1.1.0: Added remove/clear admin operations
//! - 1.0.0: Initial release with flat file loading

use anyhow::{bail, Context, Result};
use log::{error, info};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// File-backed corpus of example messages
pub struct MessageStore {
    dir: PathBuf,
    messages: Vec<String>,
    /// Parallel to `messages`: (source file, line index within that file)
    source_map: Vec<(PathBuf, usize)>,
}

impl MessageStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let mut store = MessageStore {
            dir: data_dir.to_path_buf(),
            messages: Vec::new(),
            source_map: Vec::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Scan the data directory and reload all `.txt` messages wholesale
    pub fn reload(&mut self) -> Result<()> {
        self.messages.clear();
        self.source_map.clear();

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data dir {:?}", self.dir))?;

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();

        for path in &files {
            if let Err(e) = self.load_txt(path) {
                error!("Failed to load text file {path:?}: {e}");
            }
        }

        info!(
            "Loaded {} messages from {} files.",
            self.messages.len(),
            files.len()
        );
        Ok(())
    }

    fn load_txt(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if !line.is_empty() {
                self.messages.push(line.to_string());
                self.source_map.push((path.to_path_buf(), i));
            }
        }
        Ok(())
    }

    /// Append messages to the default `messages.txt` partition
    pub fn add_messages(&mut self, lines: &[String]) -> Result<usize> {
        let cleaned: Vec<&str> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if cleaned.is_empty() {
            return Ok(0);
        }

        let target = self.dir.join("messages.txt");
        let mut content = std::fs::read_to_string(&target).unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for line in &cleaned {
            content.push_str(line);
            content.push('\n');
        }
        std::fs::write(&target, content)
            .with_context(|| format!("Failed to write {target:?}"))?;

        self.reload()?;
        Ok(cleaned.len())
    }

    /// Remove a message by 1-based global index, editing its source file
    pub fn remove_message(&mut self, index: usize) -> Result<String> {
        if index == 0 || index > self.messages.len() {
            bail!("Invalid message index {index} (have {})", self.messages.len());
        }
        let real_idx = index - 1;
        let (path, file_idx) = self.source_map[real_idx].clone();
        let removed = self.messages[real_idx].clone();

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != file_idx)
            .map(|(_, l)| l)
            .collect();
        let mut rewritten = lines.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        std::fs::write(&path, rewritten)?;

        self.reload()?;
        Ok(removed)
    }

    /// Delete every `.txt` partition. Returns the number of messages removed
    pub fn clear_messages(&mut self) -> Result<usize> {
        let count = self.messages.len();
        let files: Vec<PathBuf> = self
            .source_map
            .iter()
            .map(|(p, _)| p.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        for path in files {
            std::fs::remove_file(&path)?;
        }
        self.reload()?;
        Ok(count)
    }

    pub fn list_messages(&self) -> &[String] {
        &self.messages
    }

    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// Draw a balanced sample of up to `count` messages.
    ///
    /// Each source file contributes roughly `count / files` messages, so a
    /// large partition cannot crowd out the others. Short draws are topped
    /// up from the unselected remainder, falling back to drawing with
    /// replacement from the whole corpus when that remainder runs out. The
    /// final selection is shuffled so partition blocks never reach the
    /// prompt in file order.
    pub fn sample(&self, count: usize) -> Vec<String> {
        let n = self.messages.len();
        if n == 0 {
            return Vec::new();
        }

        let mut rng = rand::rng();

        if count >= n {
            let mut shuffled = self.messages.clone();
            shuffled.shuffle(&mut rng);
            return shuffled;
        }

        // Group message indices by source file
        let mut by_file: HashMap<&Path, Vec<usize>> = HashMap::new();
        for (idx, (path, _)) in self.source_map.iter().enumerate() {
            by_file.entry(path.as_path()).or_default().push(idx);
        }

        let per_file = std::cmp::max(1, count / by_file.len());

        let mut selected: HashSet<usize> = HashSet::new();
        for indices in by_file.values() {
            let k = std::cmp::min(indices.len(), per_file);
            for pick in index::sample(&mut rng, indices.len(), k) {
                selected.insert(indices[pick]);
            }
        }

        let mut picked: Vec<usize> = selected.iter().copied().collect();
        picked.truncate(count);

        // Fill remaining slots from indices not yet selected
        if picked.len() < count {
            let unselected: Vec<usize> =
                (0..n).filter(|i| !selected.contains(i)).collect();
            let need = count - picked.len();
            let take = std::cmp::min(unselected.len(), need);
            for pick in index::sample(&mut rng, unselected.len(), take) {
                picked.push(unselected[pick]);
            }
        }

        // Partitions exhausted: draw with replacement rather than under-fill
        while picked.len() < count {
            picked.push(rng.random_range(0..n));
        }

        picked.shuffle(&mut rng);
        picked.into_iter().map(|i| self.messages[i].clone()).collect()
    }
}
