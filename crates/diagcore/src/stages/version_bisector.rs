//! Stage 2: bisect an ordered list of compiler versions to find the first
//! one whose output fails the oracle while its predecessor passes (spec
//! §4.5).
//!
//! The central correctness property here is skip neutrality: an
//! `Unavailable` or `Diagnostic` probe carries no evidence and must never
//! move a search boundary. Every probe is memoized so the endpoint-discovery
//! phase and the bisection phase never re-probe the same index twice.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::compile::CompileStep;
use crate::config::EngineConfig;
use crate::domain::finding::{SkipReason, VersionAttempt, VersionFinding, VersionRef, VersionSkip, VersionVerdict};
use crate::domain::outcome::{CompileOutcome, TestVerdict};
use crate::domain::reproducer::Reproducer;
use crate::domain::toolchain::CompilerFamily;
use crate::provider::ToolchainProvider;

#[derive(Debug, Clone, Copy)]
enum Probe {
    Attempt(TestVerdict),
    Skip(SkipReason),
}

pub struct VersionBisector<'a> {
    config: &'a EngineConfig,
    compile: CompileStep<'a>,
    provider: ToolchainProvider<'a>,
}

impl<'a> VersionBisector<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            compile: CompileStep::new(config),
            provider: ToolchainProvider::new(config),
        }
    }

    pub async fn bisect(
        &self,
        reproducer: &Reproducer,
        family: CompilerFamily,
        versions: &[String],
        flags: &[String],
        work_dir: &Path,
    ) -> VersionFinding {
        let n = versions.len();
        info!(count = n, ?family, "version bisection starting");

        if n == 0 {
            return finding(VersionVerdict::InsufficientCompilers, None, None, vec![], vec![]);
        }

        let mut cache: HashMap<usize, Probe> = HashMap::new();
        let mut attempts: Vec<VersionAttempt> = Vec::new();
        let mut skips: Vec<VersionSkip> = Vec::new();

        let mut record = |idx: usize, probe: Probe, attempts: &mut Vec<VersionAttempt>, skips: &mut Vec<VersionSkip>| {
            match probe {
                Probe::Attempt(verdict) => attempts.push(VersionAttempt {
                    index: idx,
                    version: versions[idx].clone(),
                    verdict,
                }),
                Probe::Skip(reason) => skips.push(VersionSkip {
                    index: idx,
                    version: versions[idx].clone(),
                    reason,
                }),
            }
        };

        // --- Phase 1: endpoint discovery -----------------------------------
        let last = n - 1;
        let p0 = self.probe_cached(&mut cache, 0, family, versions, reproducer, flags, work_dir).await;
        record(0, p0, &mut attempts, &mut skips);

        let mut observed_pass: Option<usize> = attempt_index_if(0, p0, TestVerdict::Passed);
        let mut observed_fail: Option<usize> = attempt_index_if_failing(0, p0);

        if last != 0 {
            let p_last = self.probe_cached(&mut cache, last, family, versions, reproducer, flags, work_dir).await;
            record(last, p_last, &mut attempts, &mut skips);
            observed_pass = observed_pass.or(attempt_index_if(last, p_last, TestVerdict::Passed));
            observed_fail = observed_fail.or(attempt_index_if_failing(last, p_last));
        }

        if observed_pass.is_none() || observed_fail.is_none() {
            // March inward alternately from both ends over untested indices.
            let mut left = 1usize;
            let mut right = if last >= 1 { last - 1 } else { 0 };
            let mut turn_left = true;
            while left <= right && (observed_pass.is_none() || observed_fail.is_none()) {
                let idx = if turn_left { left } else { right };
                if !cache.contains_key(&idx) {
                    let p = self.probe_cached(&mut cache, idx, family, versions, reproducer, flags, work_dir).await;
                    record(idx, p, &mut attempts, &mut skips);
                    observed_pass = observed_pass.or(attempt_index_if(idx, p, TestVerdict::Passed));
                    observed_fail = observed_fail.or(attempt_index_if_failing(idx, p));
                }
                if turn_left {
                    left += 1;
                } else if right == 0 {
                    break;
                } else {
                    right -= 1;
                }
                turn_left = !turn_left;
            }
        }

        // --- Phase 2: early exits -------------------------------------------
        if attempts.is_empty() {
            let verdict = if !skips.is_empty() && skips.iter().all(|s| s.reason == SkipReason::Diagnostic) {
                VersionVerdict::DiagnosticErrors
            } else {
                VersionVerdict::InsufficientCompilers
            };
            warn!(?verdict, "no tested version index produced evidence");
            return finding(verdict, None, None, attempts, skips);
        }

        let any_pass = attempts.iter().any(|a| a.verdict.is_passed());
        let any_fail = attempts.iter().any(|a| a.verdict.is_failing_side());

        if any_pass && !any_fail {
            let last_good = attempts.iter().filter(|a| a.verdict.is_passed()).max_by_key(|a| a.index).unwrap();
            let last_good = VersionRef { index: last_good.index, version: last_good.version.clone() };
            return finding(VersionVerdict::AllPass, None, Some(last_good), attempts, skips);
        }
        if any_fail && !any_pass {
            let first_bad = attempts.iter().filter(|a| a.verdict.is_failing_side()).min_by_key(|a| a.index).unwrap();
            let first_bad = VersionRef { index: first_bad.index, version: first_bad.version.clone() };
            return finding(VersionVerdict::AllFail, Some(first_bad), None, attempts, skips);
        }

        // --- Phase 3: binary search ------------------------------------------
        let mut lo = attempts.iter().filter(|a| a.verdict.is_passed()).map(|a| a.index).max().unwrap();
        let mut hi = attempts.iter().filter(|a| a.verdict.is_failing_side()).map(|a| a.index).min().unwrap();

        if lo >= hi {
            warn!(lo, hi, "version bisector invariant violated: passing index not below failing index");
            return finding(VersionVerdict::Error, None, None, attempts, skips);
        }

        while hi > lo + 1 {
            let mid = lo + (hi - lo) / 2;
            let probe = if let Some(cached) = cache.get(&mid).copied() {
                cached
            } else {
                let p = self.probe_cached(&mut cache, mid, family, versions, reproducer, flags, work_dir).await;
                record(mid, p, &mut attempts, &mut skips);
                p
            };

            match probe {
                Probe::Attempt(verdict) if verdict.is_passed() => lo = mid,
                Probe::Attempt(_) => hi = mid,
                Probe::Skip(_) => {
                    match self
                        .alternate_probe(&mut cache, mid, lo, hi, family, versions, reproducer, flags, work_dir, &mut attempts, &mut skips)
                        .await
                    {
                        Some((idx, verdict)) if verdict.is_passed() => lo = idx,
                        Some((idx, _)) => hi = idx,
                        None => {
                            debug!(lo, hi, "no testable index remains in range; returning partial bisection");
                            break;
                        }
                    }
                }
            }
        }

        let last_good = VersionRef { index: lo, version: versions[lo].clone() };
        let first_bad = VersionRef { index: hi, version: versions[hi].clone() };
        info!(last_good = %last_good.version, first_bad = %first_bad.version, "version bisection complete");
        finding(VersionVerdict::Bisected, Some(first_bad), Some(last_good), attempts, skips)
    }

    #[allow(clippy::too_many_arguments)]
    async fn probe_cached(
        &self,
        cache: &mut HashMap<usize, Probe>,
        idx: usize,
        family: CompilerFamily,
        versions: &[String],
        reproducer: &Reproducer,
        flags: &[String],
        work_dir: &Path,
    ) -> Probe {
        if let Some(p) = cache.get(&idx).copied() {
            return p;
        }
        let probe = self.probe(idx, family, versions, reproducer, flags, work_dir).await;
        cache.insert(idx, probe);
        probe
    }

    async fn probe(
        &self,
        idx: usize,
        family: CompilerFamily,
        versions: &[String],
        reproducer: &Reproducer,
        flags: &[String],
        work_dir: &Path,
    ) -> Probe {
        let Some(handle) = self.provider.resolve(family, &versions[idx]).await else {
            debug!(version = %versions[idx], "version unavailable, skipping");
            return Probe::Skip(SkipReason::Unavailable);
        };

        let dir = work_dir.join(format!("v{idx}"));
        let outcome = self
            .compile
            .compile(&handle, reproducer.source(), flags, &dir, self.config.default_timeout)
            .await;

        match outcome {
            CompileOutcome::Binary { path, .. } => {
                let verdict = reproducer.oracle.judge(&path, self.config.oracle_timeout).await;
                Probe::Attempt(verdict)
            }
            CompileOutcome::InternalError { .. } => Probe::Attempt(TestVerdict::Failed),
            CompileOutcome::Timeout => Probe::Attempt(TestVerdict::Failed),
            CompileOutcome::Diagnostic { .. } => Probe::Skip(SkipReason::Diagnostic),
            CompileOutcome::Unavailable => Probe::Skip(SkipReason::Unavailable),
        }
    }

    /// Scan outward from `mid` toward `lo` and `hi` in increasing offsets for
    /// the nearest unprobed testable index, per spec §4.5 step 3. Returns the
    /// first genuine attempt found, or `None` if the range is exhausted.
    #[allow(clippy::too_many_arguments)]
    async fn alternate_probe(
        &self,
        cache: &mut HashMap<usize, Probe>,
        mid: usize,
        lo: usize,
        hi: usize,
        family: CompilerFamily,
        versions: &[String],
        reproducer: &Reproducer,
        flags: &[String],
        work_dir: &Path,
        attempts: &mut Vec<VersionAttempt>,
        skips: &mut Vec<VersionSkip>,
    ) -> Option<(usize, TestVerdict)> {
        let mut offset = 1usize;
        loop {
            let left = mid.checked_sub(offset).filter(|&i| i > lo);
            let right = mid.checked_add(offset).filter(|&i| i < hi);
            if left.is_none() && right.is_none() {
                return None;
            }
            for idx in [left, right].into_iter().flatten() {
                let probe = self.probe_cached(cache, idx, family, versions, reproducer, flags, work_dir).await;
                match probe {
                    Probe::Attempt(_) => {}
                    Probe::Skip(reason) => {
                        if !skips.iter().any(|s| s.index == idx) {
                            skips.push(VersionSkip { index: idx, version: versions[idx].clone(), reason });
                        }
                        continue;
                    }
                }
                if let Probe::Attempt(verdict) = probe {
                    if !attempts.iter().any(|a| a.index == idx) {
                        attempts.push(VersionAttempt { index: idx, version: versions[idx].clone(), verdict });
                    }
                    return Some((idx, verdict));
                }
            }
            offset += 1;
        }
    }
}

fn attempt_index_if(idx: usize, probe: Probe, target: TestVerdict) -> Option<usize> {
    matches!(probe, Probe::Attempt(v) if v == target).then_some(idx)
}

fn attempt_index_if_failing(idx: usize, probe: Probe) -> Option<usize> {
    matches!(probe, Probe::Attempt(v) if v.is_failing_side()).then_some(idx)
}

fn finding(
    verdict: VersionVerdict,
    first_bad: Option<VersionRef>,
    last_good: Option<VersionRef>,
    attempts: Vec<VersionAttempt>,
    skips: Vec<VersionSkip>,
) -> VersionFinding {
    VersionFinding {
        verdict,
        first_bad,
        last_good,
        attempts,
        skips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_index_if_matches_exact_verdict() {
        assert_eq!(attempt_index_if(3, Probe::Attempt(TestVerdict::Passed), TestVerdict::Passed), Some(3));
        assert_eq!(attempt_index_if(3, Probe::Attempt(TestVerdict::Failed), TestVerdict::Passed), None);
        assert_eq!(attempt_index_if(3, Probe::Skip(SkipReason::Unavailable), TestVerdict::Passed), None);
    }

    #[test]
    fn attempt_index_if_failing_covers_failed_and_timeout() {
        assert!(attempt_index_if_failing(0, Probe::Attempt(TestVerdict::Failed)).is_some());
        assert!(attempt_index_if_failing(0, Probe::Attempt(TestVerdict::Timeout)).is_some());
        assert!(attempt_index_if_failing(0, Probe::Attempt(TestVerdict::Passed)).is_none());
    }
}
