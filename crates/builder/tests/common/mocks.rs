use async_trait::async_trait;
use mtfw_builder::error::BuildResult;
use mtfw_builder::{BuildTree, CommandOutput, CompileOptions, Toolchain};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the fake compiler does.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub enum CompileBehavior {
    /// Exit 0 and write these file names into the output directory.
    Produce(Vec<&'static str>),
    /// Exit 1 with this stderr.
    Fail(&'static str),
    /// Never finish.
    Hang,
}

/// What the fake dependency installer does.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum DepsBehavior {
    Install,
    Fail,
    Hang,
}

/// Toolchain double that writes artifacts into the build tree like PlatformIO.
#[allow(dead_code)]
pub struct FakeToolchain {
    pub compile: CompileBehavior,
    pub deps: DepsBehavior,
    pub install_calls: AtomicUsize,
    pub compile_calls: AtomicUsize,
    pub setup_calls: AtomicUsize,
    /// Contents of every staged config, captured while "compiling".
    pub staged_seen: Mutex<Vec<Option<String>>>,
    pub last_options: Mutex<Option<CompileOptions>>,
}

#[allow(dead_code)]
impl FakeToolchain {
    pub fn new(compile: CompileBehavior) -> Self {
        Self {
            compile,
            deps: DepsBehavior::Install,
            install_calls: AtomicUsize::new(0),
            compile_calls: AtomicUsize::new(0),
            setup_calls: AtomicUsize::new(0),
            staged_seen: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
        }
    }

    pub fn producing(files: &[&'static str]) -> Self {
        Self::new(CompileBehavior::Produce(files.to_vec()))
    }

    pub fn failing(stderr: &'static str) -> Self {
        Self::new(CompileBehavior::Fail(stderr))
    }

    pub fn with_deps(mut self, deps: DepsBehavior) -> Self {
        self.deps = deps;
        self
    }

    pub fn compiles(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }
}

fn ok() -> CommandOutput {
    CommandOutput {
        success: true,
        exit_code: Some(0),
        ..Default::default()
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn install_dependencies(
        &self,
        tree: &BuildTree,
        variant: &str,
    ) -> BuildResult<CommandOutput> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        match self.deps {
            DepsBehavior::Install => {
                tokio::fs::create_dir_all(tree.libdeps_dir(variant).join("RadioLib")).await?;
                Ok(ok())
            }
            DepsBehavior::Fail => Ok(CommandOutput {
                success: false,
                exit_code: Some(1),
                stderr: "registry unreachable".to_string(),
                ..Default::default()
            }),
            DepsBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ok())
            }
        }
    }

    async fn compile(
        &self,
        tree: &BuildTree,
        variant: &str,
        options: &CompileOptions,
    ) -> BuildResult<CommandOutput> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());

        let mut seen = Vec::new();
        for path in tree.staging_paths() {
            seen.push(tokio::fs::read_to_string(&path).await.ok());
        }
        *self.staged_seen.lock().unwrap() = seen;

        match &self.compile {
            CompileBehavior::Produce(files) => {
                let out = match &options.scratch_dir {
                    Some(scratch) => scratch.join(variant),
                    None => tree.variant_output_dir(variant),
                };
                tokio::fs::create_dir_all(&out).await?;
                for name in files {
                    tokio::fs::write(out.join(name), format!("image:{name}")).await?;
                }
                Ok(ok())
            }
            CompileBehavior::Fail(stderr) => Ok(CommandOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            CompileBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ok())
            }
        }
    }

    async fn setup_project(&self, _tree: &BuildTree) -> BuildResult<CommandOutput> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ok())
    }
}
