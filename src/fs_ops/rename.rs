//! Applies a validated `RenamePlan` to the disk, one independent rename per entry.

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;

use crate::core::{PlannedRename, RenamePlan};

/// Performs a single rename. Abstracted so tests can inject failures.
pub trait FileRenamer: Send + Sync {
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()>;
}

/// Renames on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRenamer {
    pub allow_overwrite: bool,
}

impl FileRenamer for FsRenamer {
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        if !self.allow_overwrite && from != to && to.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "target already exists",
            ));
        }
        fs::rename(from, to)
    }
}

/// Result of one planned rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOutcome {
    pub success: bool,
    pub old_path: String,
    pub new_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn apply_one(entry: &PlannedRename, renamer: &dyn FileRenamer) -> RenameOutcome {
    match renamer.rename(&entry.old_path, &entry.new_path) {
        Ok(()) => RenameOutcome {
            success: true,
            old_path: entry.old_path.to_string(),
            new_path: entry.new_path.to_string(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(
                "Failed to rename {:?} -> {:?}: {}",
                entry.old_path,
                entry.new_path,
                e
            );
            RenameOutcome {
                success: false,
                old_path: entry.old_path.to_string(),
                new_path: entry.new_path.to_string(),
                error: Some(e.to_string()),
            }
        }
    }
}

fn failed(entry: &PlannedRename, error: String) -> RenameOutcome {
    tracing::warn!(
        "Skipped rename {:?} -> {:?}: {}",
        entry.old_path,
        entry.new_path,
        error
    );
    RenameOutcome {
        success: false,
        old_path: entry.old_path.to_string(),
        new_path: entry.new_path.to_string(),
        error: Some(error),
    }
}

/// One unit of a dependency-ordered schedule.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Single(usize),
    /// `cycle[m]` renames onto the source of `cycle[m + 1]`, wrapping around.
    Cycle(Vec<usize>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// For each entry, the entry whose source it renames onto, if any.
///
/// Targets are unique within a plan, so every source is claimed by at most
/// one other entry and the graph is a set of disjoint chains and cycles.
fn blockers(plan: &RenamePlan) -> Vec<Option<usize>> {
    let sources: HashMap<&Utf8Path, usize> = plan
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.old_path.as_path(), i))
        .collect();
    plan.entries
        .iter()
        .enumerate()
        .map(|(i, e)| sources.get(e.new_path.as_path()).copied().filter(|&j| j != i))
        .collect()
}

/// Orders entries so every source is moved away before another entry lands on it.
fn schedule(blockers: &[Option<usize>]) -> Vec<Step> {
    let mut state = vec![Visit::New; blockers.len()];
    let mut steps = Vec::with_capacity(blockers.len());

    for start in 0..blockers.len() {
        if state[start] != Visit::New {
            continue;
        }
        let mut path = Vec::new();
        let mut cycle_at = None;
        let mut current = Some(start);
        while let Some(i) = current {
            match state[i] {
                Visit::New => {
                    state[i] = Visit::Active;
                    path.push(i);
                    current = blockers[i];
                }
                Visit::Active => {
                    cycle_at = path.iter().position(|&p| p == i);
                    break;
                }
                Visit::Done => break,
            }
        }

        let chain_len = match cycle_at {
            Some(pos) => {
                steps.push(Step::Cycle(path[pos..].to_vec()));
                pos
            }
            None => path.len(),
        };
        steps.extend(path[..chain_len].iter().rev().map(|&i| Step::Single(i)));
        for i in path {
            state[i] = Visit::Done;
        }
    }
    steps
}

fn temporary_path(path: &Utf8Path) -> Utf8PathBuf {
    let name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or("rename"),
        uuid::Uuid::new_v4().simple()
    );
    match path.parent() {
        Some(parent) => parent.join(name),
        None => Utf8PathBuf::from(name),
    }
}

/// Runs a cycle by parking the first source under a temporary name.
fn apply_cycle(
    cycle: &[usize],
    entries: &[PlannedRename],
    renamer: &dyn FileRenamer,
    outcomes: &mut [Option<RenameOutcome>],
) {
    let Some((&first, rest)) = cycle.split_first() else {
        return;
    };
    let parked = &entries[first];
    let temp = temporary_path(&parked.old_path);

    if let Err(e) = renamer.rename(&parked.old_path, &temp) {
        let error = format!("could not move aside to break a rename cycle: {}", e);
        for &i in cycle {
            outcomes[i] = Some(failed(&entries[i], error.clone()));
        }
        return;
    }

    // Reverse order: each rename frees the target of the one after it.
    let mut broken = None;
    for &i in rest.iter().rev() {
        let outcome = match broken {
            Some(ref error) => failed(&entries[i], format!("blocked by {}", error)),
            None => apply_one(&entries[i], renamer),
        };
        if !outcome.success && broken.is_none() {
            broken = Some(format!("failed rename of {}", entries[i].old_path));
        }
        outcomes[i] = Some(outcome);
    }

    let outcome = match broken {
        None => match renamer.rename(&temp, &parked.new_path) {
            Ok(()) => RenameOutcome {
                success: true,
                old_path: parked.old_path.to_string(),
                new_path: parked.new_path.to_string(),
                error: None,
            },
            Err(e) => failed(parked, format!("{} (file left at {})", e, temp)),
        },
        Some(error) => {
            // The source slot is still free only if the entry that renames onto it never ran.
            let slot_taken = rest
                .last()
                .and_then(|&i| outcomes[i].as_ref())
                .is_some_and(|o| o.success);
            if !slot_taken && renamer.rename(&temp, &parked.old_path).is_ok() {
                failed(parked, format!("blocked by {}", error))
            } else {
                failed(parked, format!("blocked by {} (file left at {})", error, temp))
            }
        }
    };
    outcomes[first] = Some(outcome);
}

fn apply_scheduled(plan: &RenamePlan, renamer: &dyn FileRenamer) -> Vec<RenameOutcome> {
    let blockers = blockers(plan);
    let entries = &plan.entries;
    let mut outcomes: Vec<Option<RenameOutcome>> = vec![None; entries.len()];

    for step in schedule(&blockers) {
        match step {
            Step::Single(i) => {
                let blocked_by = blockers[i]
                    .filter(|&j| outcomes[j].as_ref().is_some_and(|o| !o.success));
                outcomes[i] = Some(match blocked_by {
                    Some(j) => failed(
                        &entries[i],
                        format!("blocked by failed rename of {}", entries[j].old_path),
                    ),
                    None => apply_one(&entries[i], renamer),
                });
            }
            Step::Cycle(cycle) => apply_cycle(&cycle, entries, renamer, &mut outcomes),
        }
    }

    outcomes
        .into_iter()
        .zip(entries)
        .map(|(outcome, entry)| {
            outcome.unwrap_or_else(|| failed(entry, "rename was not scheduled".into()))
        })
        .collect()
}

/// Applies every entry of `plan`, returning one outcome per entry in plan order.
///
/// A failing entry never stops independent siblings. Independent entries run
/// on a pool of `workers` threads. When an entry renames onto another entry's
/// source (`0 -> 1`, `1 -> 2`), the plan runs sequentially in dependency
/// order, cycles are broken through a temporary name, and an entry whose
/// target could not be vacated fails instead of overwriting it.
pub fn apply_plan(plan: &RenamePlan, renamer: &dyn FileRenamer, workers: usize) -> Vec<RenameOutcome> {
    if blockers(plan).iter().any(Option::is_some) {
        tracing::debug!("Rename plan has chained targets, applying in dependency order");
        return apply_scheduled(plan, renamer);
    }
    if workers <= 1 {
        return plan
            .entries
            .iter()
            .map(|entry| apply_one(entry, renamer))
            .collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| {
            plan.entries
                .par_iter()
                .map(|entry| apply_one(entry, renamer))
                .collect()
        }),
        Err(e) => {
            tracing::warn!("Failed to build rename pool ({}), renaming sequentially", e);
            plan.entries
                .iter()
                .map(|entry| apply_one(entry, renamer))
                .collect()
        }
    }
}

/// Counts successes and failures of an applied plan.
pub fn summarize(outcomes: &[RenameOutcome]) -> (usize, usize) {
    let ok = outcomes.iter().filter(|o| o.success).count();
    (ok, outcomes.len() - ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{plan, FileRecord};
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn touch(dir: &Utf8Path, name: &str) -> FileRecord {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        FileRecord::new(name, path).selected(true)
    }

    #[test]
    fn test_apply_renames_on_disk() {
        let dir = tempdir().unwrap();
        let root = utf8_dir(&dir);
        let files = vec![
            touch(&root, "小明-期末作业.docx"),
            touch(&root, "小红-期末作业.docx"),
        ];
        let plan = plan(&files, "{class}-{name}-{index}", "计科2206").unwrap();

        let outcomes = apply_plan(&plan, &FsRenamer::default(), 4);
        assert_eq!(summarize(&outcomes), (2, 0));
        assert!(root.join("计科2206-小明-1.docx").exists());
        assert!(root.join("计科2206-小红-2.docx").exists());
        assert!(!root.join("小明-期末作业.docx").exists());
    }

    #[test]
    fn test_failures_are_reported_per_entry() {
        let dir = tempdir().unwrap();
        let root = utf8_dir(&dir);
        let mut files = vec![touch(&root, "a-1.txt"), touch(&root, "b-1.txt")];
        // Source vanished before the plan was applied.
        files.insert(1, FileRecord::new("ghost", root.join("ghost-1.txt")).selected(true));

        let plan = plan(&files, "{name}_{index}", "x").unwrap();
        let outcomes = apply_plan(&plan, &FsRenamer::default(), 2);

        let flags: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert!(outcomes[1].error.is_some());
        assert_eq!(outcomes[1].old_path, root.join("ghost-1.txt").to_string());
        assert!(root.join("a_1.txt").exists());
        assert!(root.join("b_3.txt").exists());
    }

    #[test]
    fn test_existing_target_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let root = utf8_dir(&dir);
        let files = vec![touch(&root, "a-1.txt")];
        fs::write(root.join("taken.txt"), "keep me").unwrap();

        let plan = plan(&files, "taken", "x").unwrap();
        let outcomes = apply_plan(&plan, &FsRenamer::default(), 1);
        assert!(!outcomes[0].success);
        assert_eq!(fs::read_to_string(root.join("taken.txt")).unwrap(), "keep me");

        let outcomes = apply_plan(&plan, &FsRenamer { allow_overwrite: true }, 1);
        assert!(outcomes[0].success);
        assert_eq!(fs::read_to_string(root.join("taken.txt")).unwrap(), "a-1.txt");
    }

    fn chained_plan(root: &Utf8Path, moves: &[(&str, &str)]) -> RenamePlan {
        RenamePlan {
            folder_name: "d".into(),
            template: "{index}".into(),
            entries: moves
                .iter()
                .enumerate()
                .map(|(i, (from, to))| PlannedRename {
                    id: i.to_string(),
                    old_path: root.join(from),
                    new_name: to.to_string(),
                    new_path: root.join(to),
                })
                .collect(),
        }
    }

    fn read(root: &Utf8Path, name: &str) -> Option<String> {
        fs::read_to_string(root.join(name)).ok()
    }

    #[test]
    fn test_index_shift_renames_every_file() {
        for allow_overwrite in [false, true] {
            let dir = tempdir().unwrap();
            let root = utf8_dir(&dir);
            let files = vec![touch(&root, "0.txt"), touch(&root, "1.txt"), touch(&root, "2.txt")];
            let plan = plan(&files, "{index}", "d").unwrap();

            let outcomes = apply_plan(&plan, &FsRenamer { allow_overwrite }, 4);
            let flags: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
            assert_eq!(flags, vec![true, true, true]);
            assert_eq!(outcomes[0].new_path, root.join("1.txt").to_string());

            assert_eq!(read(&root, "0.txt"), None);
            assert_eq!(read(&root, "1.txt").as_deref(), Some("0.txt"));
            assert_eq!(read(&root, "2.txt").as_deref(), Some("1.txt"));
            assert_eq!(read(&root, "3.txt").as_deref(), Some("2.txt"));
        }
    }

    #[test]
    fn test_swap_goes_through_temporary_name() {
        let dir = tempdir().unwrap();
        let root = utf8_dir(&dir);
        fs::write(root.join("a.txt"), "A").unwrap();
        fs::write(root.join("b.txt"), "B").unwrap();
        fs::write(root.join("c.txt"), "C").unwrap();

        let plan = chained_plan(&root, &[("a.txt", "b.txt"), ("b.txt", "c.txt"), ("c.txt", "a.txt")]);
        let outcomes = apply_plan(&plan, &FsRenamer::default(), 4);
        assert_eq!(summarize(&outcomes), (3, 0));

        assert_eq!(read(&root, "a.txt").as_deref(), Some("C"));
        assert_eq!(read(&root, "b.txt").as_deref(), Some("A"));
        assert_eq!(read(&root, "c.txt").as_deref(), Some("B"));
        assert_eq!(fs::read_dir(&root).unwrap().count(), 3);
    }

    #[test]
    fn test_schedule_orders_chains_and_cycles() {
        // 0 -> src(1), 1 -> src(2), 2 free; 3 <-> 4
        let blockers = vec![Some(1), Some(2), None, Some(4), Some(3)];
        assert_eq!(
            schedule(&blockers),
            vec![
                Step::Single(2),
                Step::Single(1),
                Step::Single(0),
                Step::Cycle(vec![3, 4]),
            ]
        );
    }

    /// Refuses to move one specific source.
    struct StubbornRenamer {
        stuck: Utf8PathBuf,
        inner: FsRenamer,
    }

    impl FileRenamer for StubbornRenamer {
        fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
            if from == self.stuck {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            self.inner.rename(from, to)
        }
    }

    #[test]
    fn test_failed_link_never_overwrites_its_dependents() {
        let dir = tempdir().unwrap();
        let root = utf8_dir(&dir);
        let files = vec![touch(&root, "0.txt"), touch(&root, "1.txt"), touch(&root, "2.txt")];
        let plan = plan(&files, "{index}", "d").unwrap();
        let renamer = StubbornRenamer {
            stuck: root.join("1.txt"),
            inner: FsRenamer {
                allow_overwrite: true,
            },
        };

        let outcomes = apply_plan(&plan, &renamer, 4);
        let flags: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
        assert_eq!(flags, vec![false, false, true]);
        assert!(outcomes[0].error.as_deref().unwrap().contains("blocked by"));

        assert_eq!(read(&root, "0.txt").as_deref(), Some("0.txt"));
        assert_eq!(read(&root, "1.txt").as_deref(), Some("1.txt"));
        assert_eq!(read(&root, "3.txt").as_deref(), Some("2.txt"));
    }

    #[test]
    fn test_broken_cycle_restores_parked_file() {
        let dir = tempdir().unwrap();
        let root = utf8_dir(&dir);
        fs::write(root.join("a.txt"), "A").unwrap();
        fs::write(root.join("b.txt"), "B").unwrap();

        let plan = chained_plan(&root, &[("a.txt", "b.txt"), ("b.txt", "a.txt")]);
        let renamer = StubbornRenamer {
            stuck: root.join("b.txt"),
            inner: FsRenamer::default(),
        };
        let outcomes = apply_plan(&plan, &renamer, 1);
        assert_eq!(summarize(&outcomes), (0, 2));

        assert_eq!(read(&root, "a.txt").as_deref(), Some("A"));
        assert_eq!(read(&root, "b.txt").as_deref(), Some("B"));
        assert_eq!(fs::read_dir(&root).unwrap().count(), 2);
    }
}
