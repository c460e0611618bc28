//! Orchestrator tests with in-process collaborators.
//!
//! Fake "documents" are text files with one line per page naming the page
//! color (`gray`, `red`, `black`, `white`). A line `BROKEN` makes the fake
//! renderer reject the document and each `WARN` line counts as a renderer
//! warning.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use image::{Rgb, RgbImage};
use rasterproof::{
    ColorMode, CorpusItem, FailureKind, HarnessConfig, ItemStage, ItemVerdict, Ledger,
    NoopObserver, Orchestrator, PageNaming, Rasterizer, RasterproofError, RasterproofResult,
    RunObserver, StructuralReport, ToleranceProfile, TransformIntent, TransformOutput, Transformer,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type Rewrite = Box<dyn Fn(&str) -> RasterproofResult<String>>;

struct FakeTransformer {
    intent: TransformIntent,
    rewrite: Rewrite,
}

impl FakeTransformer {
    fn new(
        intent: TransformIntent,
        rewrite: impl Fn(&str) -> RasterproofResult<String> + 'static,
    ) -> Self {
        Self {
            intent,
            rewrite: Box::new(rewrite),
        }
    }

    fn identity() -> Self {
        Self::new(TransformIntent::Identity, |doc| Ok(doc.to_string()))
    }
}

impl Transformer for FakeTransformer {
    fn intent(&self) -> TransformIntent {
        self.intent.clone()
    }

    fn transform(&self, input: &Path, output: &Path) -> RasterproofResult<TransformOutput> {
        let doc = std::fs::read_to_string(input)?;
        let out = (self.rewrite)(&doc)?;
        std::fs::write(output, &out)?;
        Ok(TransformOutput {
            page_count: pages(&out).len() as u32,
            image_objects: 1,
            form_objects: 0,
        })
    }
}

fn pages(doc: &str) -> Vec<&str> {
    doc.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "WARN" && *l != "BROKEN")
        .collect()
}

struct FakeRasterizer;

impl Rasterizer for FakeRasterizer {
    fn naming(&self) -> PageNaming {
        PageNaming::default()
    }

    fn rasterize(&self, doc: &Path, out_dir: &Path, mode: ColorMode) -> RasterproofResult<()> {
        let text = std::fs::read_to_string(doc)?;
        for (i, page) in pages(&text).into_iter().enumerate() {
            let mut rgb = match page {
                "red" => [220, 20, 20],
                "black" => [0, 0, 0],
                "white" => [255, 255, 255],
                "gray" => [128, 128, 128],
                other => return Err(RasterproofError::rasterize(format!("unknown page {other}"))),
            };
            if mode == ColorMode::Gray {
                let luma = ((u16::from(rgb[0]) + u16::from(rgb[1]) + u16::from(rgb[2])) / 3) as u8;
                rgb = [luma; 3];
            }
            let path = out_dir.join(self.naming().file_name(i as u32 + 1));
            RgbImage::from_pixel(8, 8, Rgb(rgb)).save(path).unwrap();
        }
        Ok(())
    }

    fn structural_check(&self, doc: &Path) -> RasterproofResult<StructuralReport> {
        let text = std::fs::read_to_string(doc)?;
        if text.lines().any(|l| l.trim() == "BROKEN") {
            return Err(RasterproofError::structural("cannot parse"));
        }
        Ok(StructuralReport {
            warnings: text.lines().filter(|l| l.trim() == "WARN").count(),
        })
    }
}

struct Fixture {
    _root: TempDir,
    corpus: PathBuf,
    out: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let corpus = root.path().join("corpus");
        let out = root.path().join("out");
        std::fs::create_dir_all(&corpus).unwrap();
        Self {
            _root: root,
            corpus,
            out,
        }
    }

    fn doc(&self, name: &str, body: &str) -> CorpusItem {
        let path = self.corpus.join(name);
        std::fs::write(&path, body).unwrap();
        CorpusItem::from_path(path).unwrap()
    }

    fn config(&self) -> HarnessConfig {
        HarnessConfig::new()
            .with_output_dir(&self.out)
            .with_ledger_path(None)
    }

    fn work_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.out)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect()
    }
}

fn failure_kind(verdict: &ItemVerdict) -> Option<FailureKind> {
    verdict.failure.as_ref().map(|f| f.kind)
}

mod identity_tests {
    use super::*;

    #[test]
    fn test_identity_passes_and_records() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\nred\n"), fx.doc("b.doc", "white\n")];
        let ledger_path = fx.out.join("results.csv");
        let mut ledger = Ledger::load(&ledger_path).unwrap();

        let orch = Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, fx.config());
        let summary = orch.run(&items, Some(&mut ledger), &mut NoopObserver).unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.passed(), 2);
        assert!(!summary.halted);
        assert_eq!(summary.verdicts[0].stage(), ItemStage::Passed);
        assert_eq!(summary.verdicts[0].stage_reached, ItemStage::Validated);

        let reloaded = Ledger::load(&ledger_path).unwrap();
        let a = reloaded.get("a.doc").unwrap();
        assert!(a.color_in);
        assert!(a.color_out);
        assert_eq!(a.num_pages, 2);
        assert_eq!(a.image_objects, 1);
        assert!(!reloaded.get("b.doc").unwrap().color_in);
    }

    #[test]
    fn test_changed_page_fails_comparison() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\ngray\n")];
        let darken = FakeTransformer::new(TransformIntent::Identity, |doc| {
            Ok(doc.replacen("gray", "black", 1))
        });

        let orch = Orchestrator::new(darken, FakeRasterizer, fx.config());
        let summary = orch.run(&items, None, &mut NoopObserver).unwrap();

        let verdict = &summary.verdicts[0];
        assert_eq!(failure_kind(verdict), Some(FailureKind::Comparison));
        assert_eq!(verdict.stage_reached, ItemStage::Validated);
        assert!(verdict.failure.as_ref().unwrap().message.contains("page 1"));
    }

    #[test]
    fn test_per_item_tolerance_override() {
        let fx = Fixture::new();
        let items = vec![fx.doc("noisy.doc", "gray\n"), fx.doc("strict.doc", "gray\n")];
        let darken = FakeTransformer::new(TransformIntent::Identity, |doc| {
            Ok(doc.replace("gray", "black"))
        });
        let config = fx
            .config()
            .with_run_all(true)
            .with_override("noisy.doc", ToleranceProfile::new(1.0, 255.0));

        let summary = Orchestrator::new(darken, FakeRasterizer, config)
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert!(summary.verdicts[0].passed());
        assert_eq!(
            failure_kind(&summary.verdicts[1]),
            Some(FailureKind::Comparison)
        );
    }

    #[test]
    fn test_dropped_page_is_count_mismatch() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\nwhite\n")];
        let drop_last = FakeTransformer::new(TransformIntent::Identity, |_| Ok("gray\n".into()));

        let summary = Orchestrator::new(drop_last, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        let failure = summary.verdicts[0].failure.clone().unwrap();
        assert_eq!(failure.kind, FailureKind::Comparison);
        assert!(failure.message.contains("page count"));
    }

    #[test]
    fn test_grayscale_rendering_hides_color() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "red\n")];
        let config = fx.config().with_compare_grayscale(true);
        let summary = Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, config)
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert!(summary.is_success());
        assert!(!summary.verdicts[0].color_in);
    }
}

mod policy_tests {
    use super::*;

    fn flaky() -> FakeTransformer {
        FakeTransformer::new(TransformIntent::Identity, |doc| {
            if doc.contains("black") {
                Err(RasterproofError::transform("unsupported content"))
            } else {
                Ok(doc.to_string())
            }
        })
    }

    #[test]
    fn test_fail_fast_halts() {
        let fx = Fixture::new();
        let items = vec![
            fx.doc("1.doc", "gray\n"),
            fx.doc("2.doc", "black\n"),
            fx.doc("3.doc", "gray\n"),
        ];
        let summary = Orchestrator::new(flaky(), FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();

        assert!(summary.halted);
        assert_eq!(summary.verdicts.len(), 2);
        assert_eq!(failure_kind(&summary.verdicts[1]), Some(FailureKind::Transform));
        assert_eq!(summary.verdicts[1].stage_reached, ItemStage::Pending);
    }

    #[test]
    fn test_run_all_continues_and_writes_bad_list() {
        let fx = Fixture::new();
        let items = vec![
            fx.doc("1.doc", "gray\n"),
            fx.doc("2.doc", "black\n"),
            fx.doc("3.doc", "gray\n"),
        ];
        let bad_list = fx.out.join("bad.txt");
        let config = fx
            .config()
            .with_run_all(true)
            .with_bad_list_path(Some(bad_list.clone()));
        let summary = Orchestrator::new(flaky(), FakeRasterizer, config)
            .run(&items, None, &mut NoopObserver)
            .unwrap();

        assert!(!summary.halted);
        assert_eq!(summary.verdicts.len(), 3);
        assert_eq!(summary.failed(), 1);
        let listed = std::fs::read_to_string(&bad_list).unwrap();
        assert_eq!(listed.trim(), items[1].path.to_string_lossy());

        let replay = rasterproof::corpus::from_bad_list(&bad_list).unwrap();
        assert_eq!(replay, vec![items[1].clone()]);
    }

    #[test]
    fn test_rerun_reproduces_verdicts() {
        let fx = Fixture::new();
        let items = vec![fx.doc("1.doc", "gray\n"), fx.doc("2.doc", "black\n")];
        let config = fx.config().with_run_all(true);
        let orch = Orchestrator::new(flaky(), FakeRasterizer, config);

        let first = orch.run(&items, None, &mut NoopObserver).unwrap();
        let second = orch.run(&items, None, &mut NoopObserver).unwrap();
        let kinds = |s: &rasterproof::RunSummary| {
            s.verdicts.iter().map(failure_kind).collect::<Vec<_>>()
        };
        assert_eq!(kinds(&first), kinds(&second));
    }

    #[test]
    fn test_timeout_is_item_failure() {
        let fx = Fixture::new();
        let items = vec![fx.doc("slow.doc", "gray\n")];
        let hung = FakeTransformer::new(TransformIntent::Identity, |_| {
            Err(RasterproofError::Timeout {
                tool: "fake".into(),
                seconds: 1,
            })
        });
        let summary = Orchestrator::new(hung, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(failure_kind(&summary.verdicts[0]), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_missing_output_is_item_failure() {
        struct Silent;
        impl Transformer for Silent {
            fn intent(&self) -> TransformIntent {
                TransformIntent::Identity
            }
            fn transform(
                &self,
                _input: &Path,
                _output: &Path,
            ) -> RasterproofResult<TransformOutput> {
                Ok(TransformOutput::default())
            }
        }

        let fx = Fixture::new();
        let items = vec![fx.doc("1.doc", "gray\n"), fx.doc("2.doc", "gray\n")];
        let summary = Orchestrator::new(Silent, FakeRasterizer, fx.config().with_run_all(true))
            .run(&items, None, &mut NoopObserver)
            .unwrap();

        assert_eq!(summary.verdicts.len(), 2);
        for verdict in &summary.verdicts {
            assert_eq!(failure_kind(verdict), Some(FailureKind::Transform));
            assert_eq!(verdict.stage_reached, ItemStage::Pending);
            assert!(verdict.failure.as_ref().unwrap().message.contains("no output"));
        }
    }

    #[test]
    fn test_observer_sees_every_item() {
        #[derive(Default)]
        struct Recorder {
            total: usize,
            started: Vec<usize>,
            finished: Vec<bool>,
        }
        impl RunObserver for Recorder {
            fn run_started(&mut self, total: usize) {
                self.total = total;
            }
            fn item_started(&mut self, index: usize, _item: &CorpusItem) {
                self.started.push(index);
            }
            fn item_finished(&mut self, _index: usize, verdict: &ItemVerdict) {
                self.finished.push(verdict.passed());
            }
        }

        let fx = Fixture::new();
        let items = vec![fx.doc("1.doc", "gray\n"), fx.doc("2.doc", "black\n")];
        let mut recorder = Recorder::default();
        Orchestrator::new(flaky(), FakeRasterizer, fx.config().with_run_all(true))
            .run(&items, None, &mut recorder)
            .unwrap();
        assert_eq!(recorder.total, 2);
        assert_eq!(recorder.started, vec![0, 1]);
        assert_eq!(recorder.finished, vec![true, false]);
    }
}

mod structural_tests {
    use super::*;

    #[test]
    fn test_broken_output_skips_comparison() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        let breaker =
            FakeTransformer::new(TransformIntent::Identity, |doc| Ok(format!("BROKEN\n{doc}")));
        let summary = Orchestrator::new(breaker, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();

        let verdict = &summary.verdicts[0];
        assert_eq!(failure_kind(verdict), Some(FailureKind::Structural));
        assert_eq!(verdict.stage_reached, ItemStage::Transformed);
    }

    #[test]
    fn test_more_warnings_than_original_fails() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "WARN\ngray\n"), fx.doc("b.doc", "WARN\ngray\n")];
        let noisy =
            FakeTransformer::new(TransformIntent::Identity, |doc| Ok(format!("WARN\n{doc}")));
        let summary = Orchestrator::new(noisy, FakeRasterizer, fx.config().with_run_all(true))
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(summary.failure_counts().get(&FailureKind::Structural), Some(&2));
    }

    #[test]
    fn test_same_warnings_as_original_passes() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "WARN\ngray\n")];
        let summary = Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert!(summary.is_success());
    }

    #[test]
    fn test_unrenderable_page_is_rasterize_failure() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        let garble = FakeTransformer::new(TransformIntent::Identity, |_| Ok("teal\n".into()));
        let summary = Orchestrator::new(garble, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(failure_kind(&summary.verdicts[0]), Some(FailureKind::Rasterize));
        assert_eq!(summary.verdicts[0].stage_reached, ItemStage::Transformed);
    }
}

mod color_tests {
    use super::*;

    fn to_gray() -> FakeTransformer {
        FakeTransformer::new(TransformIntent::Grayscale, |doc| Ok(doc.replace("red", "gray")))
    }

    #[test]
    fn test_grayscale_transform_passes() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "white\nred\n")];
        let mut ledger = Ledger::in_memory();
        let summary = Orchestrator::new(to_gray(), FakeRasterizer, fx.config())
            .run(&items, Some(&mut ledger), &mut NoopObserver)
            .unwrap();

        assert!(summary.is_success());
        let record = ledger.get("a.doc").unwrap();
        assert!(record.color_in);
        assert!(!record.color_out);
    }

    #[test]
    fn test_color_left_behind_fails() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "white\nred\n")];
        let noop = FakeTransformer::new(TransformIntent::Grayscale, |doc| Ok(doc.to_string()));
        let summary = Orchestrator::new(noop, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();

        let verdict = &summary.verdicts[0];
        assert_eq!(failure_kind(verdict), Some(FailureKind::ColorPresent));
        assert_eq!(verdict.color_pages.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(verdict.color_out);
    }

    #[test]
    fn test_color_pages_intent() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "red\nred\nred\n")];
        let intent = TransformIntent::ColorPages([1, 3].into_iter().collect());
        let keep_odd = FakeTransformer::new(intent.clone(), |_| Ok("red\ngray\nred\n".into()));
        let summary = Orchestrator::new(keep_odd, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert!(summary.is_success());

        let keep_first = FakeTransformer::new(intent, |_| Ok("red\ngray\ngray\n".into()));
        let summary = Orchestrator::new(keep_first, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(
            failure_kind(&summary.verdicts[0]),
            Some(FailureKind::ColorMismatch)
        );
    }

    #[test]
    fn test_marked_pages_kept_with_intermediates() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "red\n")];
        let noop = FakeTransformer::new(TransformIntent::Grayscale, |doc| Ok(doc.to_string()));
        let config = fx.config().with_keep_intermediates(true);
        Orchestrator::new(noop, FakeRasterizer, config)
            .run(&items, None, &mut NoopObserver)
            .unwrap();

        let work = fx.work_dirs();
        assert_eq!(work.len(), 1);
        assert!(work[0].join("marked").join("doc-001.marked.png").is_file());
    }
}

mod environment_tests {
    use super::*;

    #[test]
    fn test_work_dirs_removed_by_default() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert!(fx.work_dirs().is_empty());
        assert!(fx.out.join("a.doc").is_file());
    }

    #[test]
    fn test_work_dirs_removed_after_comparison_failure() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        let darken =
            FakeTransformer::new(TransformIntent::Identity, |doc| Ok(doc.replace("gray", "black")));
        let summary = Orchestrator::new(darken, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(failure_kind(&summary.verdicts[0]), Some(FailureKind::Comparison));
        assert!(fx.work_dirs().is_empty());
    }

    #[test]
    fn test_work_dirs_removed_after_rasterize_failure() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        let garble = FakeTransformer::new(TransformIntent::Identity, |_| Ok("teal\n".into()));
        let summary = Orchestrator::new(garble, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(failure_kind(&summary.verdicts[0]), Some(FailureKind::Rasterize));
        assert!(fx.work_dirs().is_empty());
    }

    #[test]
    fn test_work_dirs_removed_after_color_failure() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "red\n")];
        let noop = FakeTransformer::new(TransformIntent::Grayscale, |doc| Ok(doc.to_string()));
        let summary = Orchestrator::new(noop, FakeRasterizer, fx.config())
            .run(&items, None, &mut NoopObserver)
            .unwrap();
        assert_eq!(failure_kind(&summary.verdicts[0]), Some(FailureKind::ColorPresent));
        assert!(fx.work_dirs().is_empty());
    }

    #[test]
    fn test_refuses_to_overwrite_corpus() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        let config = fx.config().with_output_dir(&fx.corpus);
        let err = Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, config)
            .run(&items, None, &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(err, RasterproofError::OutputOverwritesInput { .. }));
        assert_eq!(std::fs::read_to_string(&items[0].path).unwrap(), "gray\n");
    }

    #[test]
    fn test_ledger_write_failure_aborts_run() {
        let fx = Fixture::new();
        let items = vec![fx.doc("a.doc", "gray\n")];
        let blocker = fx.corpus.join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let mut ledger = Ledger::load(blocker.join("results.csv")).unwrap();

        let err = Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, fx.config())
            .run(&items, Some(&mut ledger), &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(err, RasterproofError::Ledger { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fx = Fixture::new();
        let config = fx.config().with_tolerance(ToleranceProfile::new(3.0, 0.0));
        let err = Orchestrator::new(FakeTransformer::identity(), FakeRasterizer, config)
            .run(&[], None, &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(err, RasterproofError::InvalidTolerance { .. }));
    }
}
