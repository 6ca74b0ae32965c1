//! Delivery tasks. These only run after a clean quality-gate run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::core::version::{self, Version};
use crate::io::config::{ContainerImageConfig, GoGithubReleaseConfig};
use crate::task::{Task, TaskContext};

/// Tags HEAD as `v<version>` and pushes tags to the configured remote.
#[derive(Default)]
pub struct GitTag;

impl Task for GitTag {
    fn info_text(&self) -> &str {
        "Create & Push Git Tag"
    }

    #[instrument(skip_all)]
    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        let version = version::canonicalize(&ctx.config.version)?;
        let tag = tag_name(&version);
        let git = ctx.git();
        git.create_tag(&tag)?;
        git.push_tags(&ctx.config.repo.remote)?;
        info!(tag = %tag, remote = %ctx.config.repo.remote, "pushed tag");
        Ok(())
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub fn tag_name(version: &Version) -> String {
    format!("v{version}")
}

const BUILD_DIR: &str = "build";
const DIST_DIR: &str = "dist";

/// `(GOOS, GOARCH)` pairs every release is built for.
const RELEASE_TARGETS: [(&str, &str); 4] = [
    ("linux", "amd64"),
    ("linux", "arm64"),
    ("darwin", "amd64"),
    ("darwin", "arm64"),
];

/// Cross-compiles the configured Go packages and publishes them as a GitHub
/// release for the already-pushed version tag.
pub struct GoGithubRelease {
    config: GoGithubReleaseConfig,
}

impl GoGithubRelease {
    pub fn new(config: GoGithubReleaseConfig) -> Self {
        Self { config }
    }
}

impl Task for GoGithubRelease {
    fn info_text(&self) -> &str {
        "GitHub Release"
    }

    #[instrument(skip_all)]
    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        let version = version::canonicalize(&ctx.config.version)?;
        for src in &self.config.build_sources {
            if src.ends_with(".go") {
                bail!("Go build source '{src}' is a file, but must be a path to a package");
            }
        }
        ctx.provisioner.ensure_available("go")?;
        ctx.provisioner.ensure_available("gh")?;

        let build_dir = ctx.root.join(BUILD_DIR);
        recreate_dir(&build_dir)?;
        for src in &self.config.build_sources {
            let bin_name = binary_name(src, ctx.root);
            for (goos, goarch) in RELEASE_TARGETS {
                let target = Path::new(BUILD_DIR).join(format!("{bin_name}-{goos}-{goarch}"));
                debug!(src = %src, goos, goarch, "cross-compiling");
                ctx.provisioner
                    .run(ctx.cancel, ctx.root, &go_build_args(goos, goarch, &target, src))
                    .with_context(|| format!("build {src} for {goos}/{goarch}"))?;
            }
        }

        let dist_dir = ctx.root.join(DIST_DIR);
        recreate_dir(&dist_dir)?;
        let artifacts = copy_artifacts(&build_dir, &dist_dir)?;
        if artifacts.is_empty() {
            return Err(anyhow!("no build artifacts found in {}", build_dir.display()));
        }

        let args = release_args(&version, self.config.draft, &artifacts);
        ctx.provisioner.run(ctx.cancel, ctx.root, &args)?;
        info!(%version, artifacts = artifacts.len(), "created GitHub release");
        Ok(())
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        Ok(())
    }
}

fn binary_name(src: &str, root: &Path) -> String {
    let from_src = Path::new(src)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| name != ".");
    from_src
        .or_else(|| {
            root.file_name()
                .map(|name| name.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| "app".to_string())
}

fn go_build_args(goos: &str, goarch: &str, target: &Path, src: &str) -> Vec<String> {
    vec![
        "env".to_string(),
        "CGO_ENABLED=0".to_string(),
        format!("GOOS={goos}"),
        format!("GOARCH={goarch}"),
        "go".to_string(),
        "build".to_string(),
        "-ldflags".to_string(),
        "-s -w -extldflags \"-static\"".to_string(),
        "-o".to_string(),
        target.to_string_lossy().to_string(),
        src.to_string(),
    ]
}

/// `gh release create` arguments. `gh` defaults `--latest` to true, so it is
/// always passed explicitly.
pub fn release_args(version: &Version, draft: bool, artifacts: &[PathBuf]) -> Vec<String> {
    let mut args = vec![
        "gh".to_string(),
        "release".to_string(),
        "create".to_string(),
        tag_name(version),
    ];
    if draft {
        args.push("--draft".to_string());
    }
    args.push("--generate-notes".to_string());
    args.push("--verify-tag".to_string());
    if version.is_prerelease() {
        args.push("--latest=false".to_string());
        args.push("--prerelease".to_string());
    } else {
        args.push("--latest=true".to_string());
    }
    args.extend(
        artifacts
            .iter()
            .map(|path| path.to_string_lossy().to_string()),
    );
    args
}

fn recreate_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err).with_context(|| format!("remove {}", dir.display())),
    }
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))
}

/// Copy regular files from `from` into `to`, returning their paths relative
/// to the repository root (`dist/<name>`), sorted.
fn copy_artifacts(from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for entry in fs::read_dir(from).with_context(|| format!("read {}", from.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", from.display()))?;
        if !entry.file_type().context("stat build artifact")?.is_file() {
            continue;
        }
        let dest = to.join(entry.file_name());
        fs::copy(entry.path(), &dest)
            .with_context(|| format!("copy {} to {}", entry.path().display(), dest.display()))?;
        copied.push(Path::new(DIST_DIR).join(entry.file_name()));
    }
    copied.sort();
    Ok(copied)
}

/// Builds the repository's Containerfile and pushes it as
/// `registry/owner/repo:version`.
pub struct ContainerImage {
    config: ContainerImageConfig,
}

impl ContainerImage {
    pub fn new(config: ContainerImageConfig) -> Self {
        Self { config }
    }
}

impl Task for ContainerImage {
    fn info_text(&self) -> &str {
        "Image Build & Push"
    }

    #[instrument(skip_all)]
    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        let version = version::canonicalize(&ctx.config.version)?;
        let image = self.config.image_ref(&version.to_string());
        ctx.provisioner.ensure_available("docker")?;

        if let Some(login) = registry_login_args(&self.config) {
            if std::env::var_os("GITHUB_TOKEN").is_none() {
                bail!("GITHUB_TOKEN must be set to push to {}", self.config.registry);
            }
            ctx.provisioner
                .run(ctx.cancel, ctx.root, &login)
                .context("log in to container registry")?;
        }

        for args in image_build_push_args(&self.config, &image) {
            ctx.provisioner.run(ctx.cancel, ctx.root, &args)?;
        }
        info!(image = %image, "pushed container image");
        Ok(())
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Login command for registries that authenticate with `GITHUB_TOKEN`.
fn registry_login_args(config: &ContainerImageConfig) -> Option<Vec<String>> {
    if !config.registry.contains("ghcr") {
        return None;
    }
    let script = format!(
        "printf '%s' \"$GITHUB_TOKEN\" | docker login {} --username {} --password-stdin",
        config.registry, config.owner
    );
    Some(vec!["bash".to_string(), "-c".to_string(), script])
}

fn image_build_push_args(config: &ContainerImageConfig, image: &str) -> [Vec<String>; 2] {
    [
        vec![
            "docker".to_string(),
            "build".to_string(),
            "--file".to_string(),
            config.containerfile.clone(),
            "--tag".to_string(),
            image.to_string(),
            ".".to_string(),
        ],
        vec!["docker".to_string(), "push".to_string(), image.to_string()],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        version::canonicalize(raw).expect("version")
    }

    #[test]
    fn stable_release_is_marked_latest() {
        let args = release_args(&v("1.4.0"), false, &[PathBuf::from("dist/app-linux-amd64")]);
        assert_eq!(
            args.join(" "),
            "gh release create v1.4.0 --generate-notes --verify-tag --latest=true dist/app-linux-amd64"
        );
    }

    #[test]
    fn prerelease_draft_is_not_latest() {
        let args = release_args(&v("1.4.0-rc.2"), true, &[]);
        assert!(args.contains(&"--draft".to_string()));
        assert!(args.contains(&"--prerelease".to_string()));
        assert!(args.contains(&"--latest=false".to_string()));
        assert_eq!(args[3], "v1.4.0-rc.2");
    }

    #[test]
    fn binary_name_falls_back_to_repo_dir() {
        assert_eq!(binary_name("./cmd/widget", Path::new("/src/acme")), "widget");
        assert_eq!(binary_name(".", Path::new("/src/acme")), "acme");
    }

    #[test]
    fn cross_compile_sets_target_platform() {
        let args = go_build_args("darwin", "arm64", Path::new("build/app-darwin-arm64"), "./cmd/app");
        assert_eq!(&args[..4], ["env", "CGO_ENABLED=0", "GOOS=darwin", "GOARCH=arm64"]);
        assert_eq!(args[args.len() - 2], "build/app-darwin-arm64");
    }

    #[test]
    fn artifacts_are_copied_into_dist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join(BUILD_DIR);
        let dist = temp.path().join(DIST_DIR);
        recreate_dir(&build).expect("build dir");
        recreate_dir(&dist).expect("dist dir");
        fs::write(build.join("app-linux-amd64"), b"bin").expect("write");
        fs::create_dir(build.join("nested")).expect("mkdir");

        let artifacts = copy_artifacts(&build, &dist).expect("copy");
        assert_eq!(artifacts, vec![PathBuf::from("dist/app-linux-amd64")]);
        assert!(dist.join("app-linux-amd64").exists());
    }

    #[test]
    fn only_ghcr_needs_login() {
        let mut cfg = ContainerImageConfig {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            ..ContainerImageConfig::default()
        };
        let login = registry_login_args(&cfg).expect("ghcr login");
        assert!(login[2].contains("docker login ghcr.io --username acme"));
        cfg.registry = "registry.example.com".to_string();
        assert!(registry_login_args(&cfg).is_none());
    }

    #[test]
    fn image_is_built_then_pushed() {
        let cfg = ContainerImageConfig {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            ..ContainerImageConfig::default()
        };
        let [build, push] = image_build_push_args(&cfg, "ghcr.io/acme/widget:1.0.0");
        assert_eq!(build[1], "build");
        assert_eq!(build[3], "Containerfile");
        assert_eq!(push, vec!["docker", "push", "ghcr.io/acme/widget:1.0.0"]);
    }
}
