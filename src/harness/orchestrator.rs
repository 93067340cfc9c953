//! Suite driver: preflight, resolve, provision once, then materialize/execute/verify
//! each testcase in order without stopping on failure.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;

use crate::core::config::Config;
use crate::core::errors::{HarnessError, Result};
use crate::harness::report::{FailureStage, SuiteReport, TestcaseVerdict};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::runtime::executor::StageExecutor;
use crate::runtime::prerequisites::Preflight;
use crate::runtime::provision::{BuildRequest, ImageProvisioner, ImageRef};
use crate::suite::fixtures::{FixtureStore, Testcase, TestcaseSelection};
use crate::suite::location::TestSuiteLocation;
use crate::suite::verify::ArtifactVerifier;
use crate::suite::workspace::{Workspace, WorkspaceMaterializer};

/// Per-invocation choices that are not part of the persistent config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub selection: TestcaseSelection,
    /// kind cluster to load the image into.
    pub cluster: Option<String>,
}

/// Progress hooks. Both default to no-ops.
pub trait RunObserver {
    fn image_ready(&mut self, _image: &ImageRef) {}
    fn testcase_started(&mut self, _testcase: &Testcase) {}
    fn testcase_finished(&mut self, _verdict: &TestcaseVerdict) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

/// Sequences one suite run against injected collaborators.
pub struct TestHarnessOrchestrator<'a> {
    preflight: &'a dyn Preflight,
    provisioner: &'a dyn ImageProvisioner,
    executor: &'a dyn StageExecutor,
    materializer: WorkspaceMaterializer,
    verifier: ArtifactVerifier,
    workflows_root: PathBuf,
    image_tag: String,
    keep_workspaces: bool,
    activity: Option<JsonlWriter>,
}

impl<'a> TestHarnessOrchestrator<'a> {
    #[must_use]
    pub fn new(
        preflight: &'a dyn Preflight,
        provisioner: &'a dyn ImageProvisioner,
        executor: &'a dyn StageExecutor,
        config: &Config,
    ) -> Self {
        Self {
            preflight,
            provisioner,
            executor,
            materializer: WorkspaceMaterializer::new(&config.workspace),
            verifier: ArtifactVerifier,
            workflows_root: config.paths.workflows_root.clone(),
            image_tag: config.runtime.image_tag.clone(),
            keep_workspaces: config.workspace.keep,
            activity: None,
        }
    }

    /// Record run events to a JSONL activity log.
    #[must_use]
    pub fn with_activity_log(mut self, writer: JsonlWriter) -> Self {
        self.activity = Some(writer);
        self
    }

    /// Run the suite at `location`.
    ///
    /// `Err` means the run aborted before the testcase loop (preflight,
    /// fixture resolution, or provisioning). Once the loop starts every
    /// testcase gets a verdict and the call returns `Ok`.
    pub fn run(
        &mut self,
        location: &TestSuiteLocation,
        options: &RunOptions,
        observer: &mut dyn RunObserver,
    ) -> Result<SuiteReport> {
        let started_at = Utc::now();
        let suite = location.to_string();
        let image_name = location.image_name(&self.image_tag);
        let mut start = LogEntry::new(EventType::RunStart, Severity::Info);
        start.suite = Some(suite.clone());
        start.image = Some(image_name.clone());
        start.details = options.cluster.as_ref().map(|c| format!("cluster={c}"));
        self.log(&start);

        match self.prepare(location, options, &image_name) {
            Ok((image, testcases)) => {
                observer.image_ready(&image);
                let mut report = SuiteReport::new(&suite, image.as_str(), started_at);
                for testcase in &testcases {
                    observer.testcase_started(testcase);
                    let verdict = self.run_testcase(&suite, &image, testcase);
                    observer.testcase_finished(&verdict);
                    report.verdicts.push(verdict);
                }

                let mut done = LogEntry::new(EventType::RunComplete, Severity::Info);
                done.suite = Some(suite);
                done.image = Some(image.to_string());
                done.passed = Some(report.passed_count());
                done.failed = Some(report.failed_count());
                self.log(&done);
                self.flush();
                Ok(report)
            }
            Err(err) => {
                let mut aborted =
                    LogEntry::new(EventType::RunAborted, Severity::Critical).with_error(&err);
                aborted.suite = Some(suite);
                aborted.image = Some(image_name);
                self.log(&aborted);
                self.flush();
                Err(err)
            }
        }
    }

    fn prepare(
        &mut self,
        location: &TestSuiteLocation,
        options: &RunOptions,
        image_name: &str,
    ) -> Result<(ImageRef, Vec<Testcase>)> {
        self.preflight.verify(options.cluster.as_deref())?;

        let store = FixtureStore::open(location.fixture_root(&self.workflows_root))?;
        let testcases = store.resolve(&options.selection)?;
        self.materializer.ensure_outside(store.root())?;

        let image = self.provisioner.build(&BuildRequest {
            source_dir: location.source_dir(&self.workflows_root),
            container_name: location.container.clone(),
            image: image_name.to_string(),
        })?;
        let mut built = LogEntry::new(EventType::ImageBuilt, Severity::Info);
        built.image = Some(image.to_string());
        self.log(&built);

        if let Some(cluster) = &options.cluster {
            self.provisioner.load(&image, cluster)?;
            let mut loaded = LogEntry::new(EventType::ImageLoaded, Severity::Info);
            loaded.image = Some(image.to_string());
            loaded.details = Some(format!("cluster={cluster}"));
            self.log(&loaded);
        }

        Ok((image, testcases))
    }

    fn run_testcase(&mut self, suite: &str, image: &ImageRef, testcase: &Testcase) -> TestcaseVerdict {
        let started = Instant::now();
        let mut workspace = None;
        let outcome = self.materialize_execute_verify(image, testcase, &mut workspace);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let workspace_path = workspace.as_ref().map(|ws| ws.root().to_path_buf());

        let mut verdict = match &outcome {
            Ok(()) => TestcaseVerdict::pass(&testcase.name, workspace_path.clone(), duration_ms),
            Err((stage, err)) => {
                TestcaseVerdict::fail(&testcase.name, *stage, err, workspace_path.clone(), duration_ms)
            }
        };

        let mut entry = match &outcome {
            Ok(()) => LogEntry::new(EventType::TestcasePass, Severity::Info),
            Err((stage, err)) => {
                let mut e = LogEntry::new(EventType::TestcaseFail, Severity::Warning).with_error(err);
                e.stage = Some(stage.to_string());
                e
            }
        };
        entry.suite = Some(suite.to_string());
        entry.testcase = Some(testcase.name.clone());
        entry.image = Some(image.to_string());
        entry.workspace = workspace_path.as_ref().map(|p| p.display().to_string());
        entry.duration_ms = Some(duration_ms);
        self.log(&entry);

        // A workspace that cannot be removed stays in the verdict so it can be found.
        if !self.keep_workspaces
            && let Some(workspace) = workspace
            && workspace.remove().is_ok()
        {
            verdict.workspace = None;
        }
        verdict
    }

    fn materialize_execute_verify(
        &self,
        image: &ImageRef,
        testcase: &Testcase,
        slot: &mut Option<Workspace>,
    ) -> std::result::Result<(), (FailureStage, HarnessError)> {
        let workspace = slot.insert(
            self.materializer
                .materialize(testcase)
                .map_err(|err| (FailureStage::Materialize, err))?,
        );

        self.executor
            .execute(image, workspace)
            .map_err(|err| (FailureStage::Execute, err))?;

        self.verify(workspace, testcase)
            .map_err(|err| (FailureStage::Verify, err))
    }

    fn verify(&self, workspace: &Workspace, testcase: &Testcase) -> Result<()> {
        self.verifier
            .verify_workspace(workspace, &testcase.after_dir())
            .into_result()
            .map_err(HarnessError::from)
    }

    fn log(&mut self, entry: &LogEntry) {
        if let Some(writer) = self.activity.as_mut() {
            writer.write_entry(entry);
        }
    }

    fn flush(&mut self) {
        if let Some(writer) = self.activity.as_mut() {
            writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::path::Path;

    use crate::core::config::Config;
    use crate::logger::jsonl::JsonlConfig;
    use crate::suite::workspace::ContractSubtree;

    struct OkPreflight;
    impl Preflight for OkPreflight {
        fn verify(&self, _cluster: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    struct MissingDocker;
    impl Preflight for MissingDocker {
        fn verify(&self, _cluster: Option<&str>) -> Result<()> {
            Err(HarnessError::MissingTool {
                tool: "docker".into(),
                remediation: "install docker".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingProvisioner {
        builds: RefCell<Vec<BuildRequest>>,
        loads: RefCell<Vec<String>>,
        fail_build: bool,
    }

    impl ImageProvisioner for RecordingProvisioner {
        fn build(&self, request: &BuildRequest) -> Result<ImageRef> {
            self.builds.borrow_mut().push(request.clone());
            if self.fail_build {
                return Err(HarnessError::ImageBuild {
                    image: request.image.clone(),
                    details: "exited with code 1".into(),
                });
            }
            Ok(ImageRef::new(request.image.clone()))
        }

        fn load(&self, _image: &ImageRef, cluster: &str) -> Result<()> {
            self.loads.borrow_mut().push(cluster.to_string());
            Ok(())
        }
    }

    /// Behaves like a stage image that renders `input/spec.yaml` to
    /// `output/deployment.yaml`, optionally rewriting it first.
    struct RenderingExecutor {
        rewrite: Option<(&'static str, &'static str)>,
        calls: Cell<usize>,
    }

    impl RenderingExecutor {
        fn faithful() -> Self {
            Self {
                rewrite: None,
                calls: Cell::new(0),
            }
        }
    }

    impl StageExecutor for RenderingExecutor {
        fn execute(&self, _image: &ImageRef, workspace: &Workspace) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            let spec = workspace.subtree(ContractSubtree::Input).join("spec.yaml");
            let mut body = fs::read_to_string(&spec).map_err(|e| HarnessError::io(&spec, e))?;
            if let Some((from, to)) = self.rewrite {
                body = body.replace(from, to);
            }
            let out = workspace.subtree(ContractSubtree::Output).join("deployment.yaml");
            fs::write(&out, body).map_err(|e| HarnessError::io(&out, e))
        }
    }

    struct Suite {
        _root: tempfile::TempDir,
        config: Config,
        location: TestSuiteLocation,
    }

    impl Suite {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.paths.workflows_root = root.path().join("workflows");
            config.workspace.base_dir = root.path().join("scratch");
            let location: TestSuiteLocation = "resource/configure/instance/demo".parse().unwrap();
            fs::create_dir_all(location.fixture_root(&config.paths.workflows_root)).unwrap();
            Self {
                _root: root,
                config,
                location,
            }
        }

        fn fixture_root(&self) -> PathBuf {
            self.location.fixture_root(&self.config.paths.workflows_root)
        }

        fn write(&self, testcase: &str, relative: &str, contents: &str) {
            let path = self.fixture_root().join(testcase).join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn add_basic(&self, name: &str) {
            self.write(name, "before/input/spec.yaml", "replicas: 1\n");
            self.write(name, "after/output/deployment.yaml", "replicas: 1\n");
        }
    }

    fn named(names: &[&str]) -> RunOptions {
        RunOptions {
            selection: TestcaseSelection::Named(names.iter().map(|n| (*n).to_string()).collect()),
            cluster: None,
        }
    }

    #[test]
    fn faithful_image_passes_basic() {
        let suite = Suite::new();
        suite.add_basic("basic");
        let provisioner = RecordingProvisioner::default();
        let executor = RenderingExecutor::faithful();

        let report = TestHarnessOrchestrator::new(&OkPreflight, &provisioner, &executor, &suite.config)
            .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
            .unwrap();

        assert_eq!(report.verdicts.len(), 1);
        assert!(report.verdicts[0].passed, "{:?}", report.verdicts[0]);
        assert_eq!(report.image, "resource-configure-instance-demo:dev");
        let builds = provisioner.builds.borrow();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].container_name, "demo");
        assert!(builds[0].source_dir.ends_with("resource/configure/instance/demo"));
        assert!(provisioner.loads.borrow().is_empty());
    }

    #[test]
    fn one_byte_difference_fails_naming_the_file() {
        let suite = Suite::new();
        suite.add_basic("basic");
        let executor = RenderingExecutor {
            rewrite: Some(("replicas: 1", "replicas: 2")),
            calls: Cell::new(0),
        };

        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &executor,
            &suite.config,
        )
        .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
        .unwrap();

        let verdict = &report.verdicts[0];
        assert!(!verdict.passed);
        assert_eq!(verdict.stage, Some(FailureStage::Verify));
        assert_eq!(verdict.error_code.as_deref(), Some("STC-3201"));
        assert!(
            verdict.cause.as_deref().unwrap().contains("output/deployment.yaml"),
            "{:?}",
            verdict.cause
        );
    }

    #[test]
    fn missing_metadata_fails_alone() {
        let suite = Suite::new();
        suite.add_basic("basic");
        suite.add_basic("missing-metadata");
        suite.write("missing-metadata", "after/metadata/status.yaml", "ready: true\n");
        let executor = RenderingExecutor::faithful();

        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &executor,
            &suite.config,
        )
        .run(&suite.location, &named(&["basic", "missing-metadata"]), &mut SilentObserver)
        .unwrap();

        assert_eq!(executor.calls.get(), 2);
        assert!(report.verdicts[0].passed);
        assert!(!report.verdicts[1].passed);
        assert_eq!(report.verdicts[1].testcase, "missing-metadata");
        assert!(report.verdicts[1].cause.as_deref().unwrap().contains("metadata"));
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn unknown_testcase_aborts_before_build_and_execution() {
        let suite = Suite::new();
        suite.add_basic("basic");
        let provisioner = RecordingProvisioner::default();
        let executor = RenderingExecutor::faithful();

        let err = TestHarnessOrchestrator::new(&OkPreflight, &provisioner, &executor, &suite.config)
            .run(&suite.location, &named(&["basic", "ghost"]), &mut SilentObserver)
            .unwrap_err();

        assert_eq!(err.code(), "STC-2002");
        assert!(err.to_string().contains("ghost"));
        assert!(provisioner.builds.borrow().is_empty());
        assert_eq!(executor.calls.get(), 0);
    }

    #[test]
    fn preflight_failure_attempts_nothing() {
        let suite = Suite::new();
        suite.add_basic("basic");
        let provisioner = RecordingProvisioner::default();
        let executor = RenderingExecutor::faithful();

        let err = TestHarnessOrchestrator::new(&MissingDocker, &provisioner, &executor, &suite.config)
            .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
            .unwrap_err();
        assert_eq!(err.code(), "STC-1101");
        assert!(provisioner.builds.borrow().is_empty());
        assert_eq!(executor.calls.get(), 0);
    }

    #[test]
    fn build_failure_is_fatal() {
        let suite = Suite::new();
        suite.add_basic("basic");
        let provisioner = RecordingProvisioner {
            fail_build: true,
            ..RecordingProvisioner::default()
        };
        let executor = RenderingExecutor::faithful();

        let err = TestHarnessOrchestrator::new(&OkPreflight, &provisioner, &executor, &suite.config)
            .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
            .unwrap_err();
        assert_eq!(err.code(), "STC-2101");
        assert_eq!(executor.calls.get(), 0);
    }

    #[test]
    fn cluster_triggers_a_single_load() {
        let suite = Suite::new();
        suite.add_basic("a");
        suite.add_basic("b");
        let provisioner = RecordingProvisioner::default();
        let options = RunOptions {
            selection: TestcaseSelection::All,
            cluster: Some("platform".into()),
        };

        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &provisioner,
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .run(&suite.location, &options, &mut SilentObserver)
        .unwrap();

        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(provisioner.builds.borrow().len(), 1);
        assert_eq!(*provisioner.loads.borrow(), vec!["platform".to_string()]);
    }

    #[test]
    fn execution_failure_skips_verification_and_continues() {
        struct FlakyExecutor(Cell<usize>);
        impl StageExecutor for FlakyExecutor {
            fn execute(&self, image: &ImageRef, workspace: &Workspace) -> Result<()> {
                let n = self.0.get();
                self.0.set(n + 1);
                if n == 0 {
                    return Err(HarnessError::ContainerExit {
                        image: image.to_string(),
                        code: Some(1),
                        stderr_tail: "boom".into(),
                    });
                }
                RenderingExecutor::faithful().execute(image, workspace)
            }
        }

        let suite = Suite::new();
        suite.add_basic("first");
        suite.add_basic("second");
        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &FlakyExecutor(Cell::new(0)),
            &suite.config,
        )
        .run(&suite.location, &named(&["first", "second"]), &mut SilentObserver)
        .unwrap();

        assert_eq!(report.verdicts[0].stage, Some(FailureStage::Execute));
        assert!(report.verdicts[0].cause.as_deref().unwrap().contains("boom"));
        assert!(report.verdicts[1].passed);
    }

    #[test]
    fn unstartable_runtime_fails_each_testcase_and_continues() {
        struct UnstartableExecutor(Cell<usize>);
        impl StageExecutor for UnstartableExecutor {
            fn execute(&self, _image: &ImageRef, _workspace: &Workspace) -> Result<()> {
                self.0.set(self.0.get() + 1);
                Err(HarnessError::ContainerStart {
                    program: "/gone/docker".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
        }

        let suite = Suite::new();
        suite.add_basic("first");
        suite.add_basic("second");
        let executor = UnstartableExecutor(Cell::new(0));
        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &executor,
            &suite.config,
        )
        .run(&suite.location, &named(&["first", "second"]), &mut SilentObserver)
        .unwrap();

        assert_eq!(executor.0.get(), 2);
        assert_eq!(report.failed_count(), 2);
        for verdict in &report.verdicts {
            assert_eq!(verdict.stage, Some(FailureStage::Execute));
            assert_eq!(verdict.error_code.as_deref(), Some("STC-3101"));
        }
    }

    #[test]
    fn workspace_base_under_fixture_root_aborts_before_build() {
        let mut suite = Suite::new();
        suite.add_basic("basic");
        suite.config.workspace.base_dir = suite.fixture_root();
        let provisioner = RecordingProvisioner::default();
        let executor = RenderingExecutor::faithful();

        let err = TestHarnessOrchestrator::new(&OkPreflight, &provisioner, &executor, &suite.config)
            .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
            .unwrap_err();

        assert_eq!(err.code(), "STC-3002");
        assert!(provisioner.builds.borrow().is_empty());
        assert_eq!(executor.calls.get(), 0);
        let listed: Vec<_> = fs::read_dir(suite.fixture_root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(listed, vec![std::ffi::OsString::from("basic")]);
    }

    #[test]
    fn report_start_time_precedes_the_build() {
        struct SlowProvisioner(RefCell<Option<chrono::DateTime<Utc>>>);
        impl ImageProvisioner for SlowProvisioner {
            fn build(&self, request: &BuildRequest) -> Result<ImageRef> {
                *self.0.borrow_mut() = Some(Utc::now());
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(ImageRef::new(request.image.clone()))
            }
            fn load(&self, _image: &ImageRef, _cluster: &str) -> Result<()> {
                Ok(())
            }
        }

        let suite = Suite::new();
        suite.add_basic("basic");
        let provisioner = SlowProvisioner(RefCell::new(None));
        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &provisioner,
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
        .unwrap();

        let build_started = provisioner.0.borrow().unwrap();
        assert!(report.started_at <= build_started, "{} > {build_started}", report.started_at);
    }

    #[test]
    fn observer_sees_every_testcase_in_order() {
        #[derive(Default)]
        struct Recorder(Vec<String>);
        impl RunObserver for Recorder {
            fn testcase_started(&mut self, testcase: &Testcase) {
                self.0.push(format!("start:{}", testcase.name));
            }
            fn testcase_finished(&mut self, verdict: &TestcaseVerdict) {
                self.0.push(format!("end:{}:{}", verdict.testcase, verdict.passed));
            }
        }

        let suite = Suite::new();
        suite.add_basic("z");
        suite.add_basic("a");
        let mut recorder = Recorder::default();
        TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .run(&suite.location, &named(&["z", "a"]), &mut recorder)
        .unwrap();

        assert_eq!(recorder.0, vec!["start:z", "end:z:true", "start:a", "end:a:true"]);
    }

    #[test]
    fn empty_fixture_root_yields_empty_report() {
        let suite = Suite::new();
        let report = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
        .unwrap();
        assert!(report.verdicts.is_empty());
        assert!(report.outcome().is_success());
    }

    #[test]
    fn workspaces_are_kept_or_removed_per_config() {
        let mut suite = Suite::new();
        suite.add_basic("basic");

        let kept = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
        .unwrap();
        let kept_path = kept.verdicts[0].workspace.clone().unwrap();
        assert!(kept_path.join("output").join("deployment.yaml").is_file());

        suite.config.workspace.keep = false;
        let removed = TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
        .unwrap();
        assert!(removed.verdicts[0].workspace.is_none());
        assert_eq!(fs::read_dir(&suite.config.workspace.base_dir).unwrap().count(), 1);
    }

    #[test]
    fn activity_log_records_the_run() {
        let suite = Suite::new();
        suite.add_basic("basic");
        let log_dir = tempfile::tempdir().unwrap();
        let log_path = log_dir.path().join("activity.jsonl");
        let mut jsonl = JsonlConfig::at(&log_path);
        jsonl.fallback_path = None;

        TestHarnessOrchestrator::new(
            &OkPreflight,
            &RecordingProvisioner::default(),
            &RenderingExecutor::faithful(),
            &suite.config,
        )
        .with_activity_log(JsonlWriter::open(jsonl))
        .run(&suite.location, &RunOptions::default(), &mut SilentObserver)
        .unwrap();

        let events: Vec<String> = fs::read_to_string(&log_path)
            .unwrap()
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            events,
            vec!["run_start", "image_built", "testcase_pass", "run_complete"]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn materialize_then_compare_is_identity(
                files in proptest::collection::btree_map(
                    "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
                    proptest::collection::vec(any::<u8>(), 0..64),
                    0..8,
                )
            ) {
                let fixtures = tempfile::tempdir().unwrap();
                let scratch = tempfile::tempdir().unwrap();
                let testcase = Testcase { name: "roundtrip".into(), dir: fixtures.path().join("roundtrip") };
                let before = testcase.before_dir().join("output");
                fs::create_dir_all(&before).unwrap();
                let mut written = 0usize;
                for (relative, bytes) in &files {
                    let path = before.join(relative);
                    // A generated file may shadow a generated directory; skip such clashes.
                    if fs::create_dir_all(path.parent().unwrap()).is_err() || path.is_dir() {
                        continue;
                    }
                    if fs::write(&path, bytes).is_ok() {
                        written += 1;
                    }
                }
                prop_assume!(written > 0 || files.is_empty());

                let mut config = Config::default();
                config.workspace.base_dir = scratch.path().to_path_buf();
                let workspace = WorkspaceMaterializer::new(&config.workspace)
                    .materialize(&testcase)
                    .unwrap();
                let result = ArtifactVerifier.compare(
                    &workspace.subtree(ContractSubtree::Output),
                    &before,
                    Path::new("output"),
                );
                prop_assert!(result.is_match(), "{:?}", result);
            }
        }
    }
}
