//! Which tasks run for which ecosystems.

use crate::core::composition::Composition;
use crate::io::config::GateConfig;
use crate::io::toolcfg;
use crate::task::TaskGroup;
use crate::task::TaskSet;
use crate::task::command::CommandTask;
use crate::task::deliver::{ContainerImage, GitTag, GoGithubRelease};
use crate::task::version_gate::VersionGate;

const YAML_FILES: [&str; 2] = ["*.yaml", "*.yml"];
const SHELL_FILES: [&str; 2] = ["*.sh", "*.bash"];
const MARKDOWN_FILES: [&str; 2] = ["*.md", "*.markdown"];
const CONTAINER_FILES: [&str; 2] = [":(icase)*containerfile*", ":(icase)*dockerfile*"];

/// Quality-gate tasks. The version check always runs first.
pub fn ci_tasks(composition: &Composition) -> TaskSet {
    let mut set = TaskSet::new();
    set.push(TaskGroup::new("Version").with_task(VersionGate::new()));
    if composition.go {
        set.push(go_group());
    }
    if composition.python {
        set.push(python_group());
    }
    if composition.shell {
        set.push(shell_group());
    }
    if composition.yaml {
        set.push(yaml_group());
    }
    if composition.markdown {
        set.push(markdown_group());
    }
    if composition.containerfile {
        set.push(containerfile_group());
    }
    set
}

/// Delivery tasks. Tagging always runs; the rest need both the ecosystem and
/// a `[deliver.*]` section.
pub fn delivery_tasks(composition: &Composition, config: &GateConfig) -> TaskSet {
    let mut set = TaskSet::new();
    set.push(TaskGroup::new("Git").with_task(GitTag));

    if composition.go
        && let Some(release) = &config.deliver.go_github_release
    {
        set.push(TaskGroup::new("Go").with_task(GoGithubRelease::new(release.clone())));
    }
    if composition.containerfile
        && let Some(image) = &config.deliver.container_image
    {
        set.push(
            TaskGroup::new("Containerfile").with_task(ContainerImage::new(image.clone())),
        );
    }
    set
}

fn go_group() -> TaskGroup {
    TaskGroup::new("Go")
        .with_task(
            CommandTask::builder("go.mod tidy check")
                .args(["go", "mod", "tidy"])
                .build(),
        )
        .with_task(CommandTask::builder("Format").args(["go", "fmt", "./..."]).build())
        .with_task(
            CommandTask::builder("Format imports")
                .args(["goimports", "-l", "-w", "."])
                .build(),
        )
        .with_task(
            CommandTask::builder("Generate code")
                .args(["go", "generate", "./..."])
                .build(),
        )
        .with_task(CommandTask::builder("Build").args(["go", "build", "./..."]).build())
        .with_task(CommandTask::builder("Vet").args(["go", "vet", "./..."]).build())
        .with_task(
            CommandTask::builder("Lint (staticcheck)")
                .args(["staticcheck", "./..."])
                .config_file(toolcfg::STATICCHECK)
                .build(),
        )
        .with_task(
            CommandTask::builder("Lint (revive)")
                .args([
                    "revive",
                    "--config",
                    "{{ config_file }}",
                    "--set_exit_status",
                    "./...",
                ])
                .config_file(toolcfg::REVIVE)
                .build(),
        )
        .with_task(
            CommandTask::builder("Lint (errcheck)")
                .args(["errcheck", "./..."])
                .build(),
        )
        .with_task(
            CommandTask::builder("Vulnerability scan (govulncheck)")
                .args(["govulncheck", "./..."])
                .build(),
        )
        .with_task(CommandTask::builder("Tests").args(["go", "test", "./..."]).build())
}

fn python_group() -> TaskGroup {
    TaskGroup::new("Python")
        .with_task(CommandTask::builder("Build").args(["uv", "build"]).build())
        .with_task(
            CommandTask::builder("Lint (ruff)")
                .args(["ruff", "check", "--fix", "./src"])
                .build(),
        )
        .with_task(
            CommandTask::builder("Format (ruff)")
                .args(["ruff", "format", "./src"])
                .build(),
        )
        .with_task(
            CommandTask::builder("Lint (pydoclint)")
                .args(["uvx", "pydoclint", "./src"])
                .build(),
        )
        .with_task(
            CommandTask::builder("Type-check (mypy)")
                .args(["uvx", "mypy", "./src"])
                .build(),
        )
}

fn shell_group() -> TaskGroup {
    TaskGroup::new("Shell")
        .with_task(
            CommandTask::builder("Lint (shellcheck)")
                .args(["shellcheck"])
                .files(SHELL_FILES)
                .build(),
        )
        .with_task(
            CommandTask::builder("Format (shfmt)")
                .args(["shfmt", "-w"])
                .files(SHELL_FILES)
                .build(),
        )
}

fn yaml_group() -> TaskGroup {
    TaskGroup::new("YAML")
        .with_task(
            CommandTask::builder("Format (yamlfmt)")
                .args(["yamlfmt", "-conf", "{{ config_file }}"])
                .config_file(toolcfg::YAMLFMT)
                .files(YAML_FILES)
                .build(),
        )
        .with_task(
            CommandTask::builder("Lint (yamllint)")
                .args(["yamllint", "--strict", "--config-file", "{{ config_file }}"])
                .config_file(toolcfg::YAMLLINT)
                .files(YAML_FILES)
                .build(),
        )
}

fn markdown_group() -> TaskGroup {
    TaskGroup::new("Markdown").with_task(
        CommandTask::builder("Lint (markdownlint)")
            .args(["markdownlint-cli2", "--config", "{{ config_file }}"])
            .config_file(toolcfg::MARKDOWNLINT)
            .files(MARKDOWN_FILES)
            .build(),
    )
}

fn containerfile_group() -> TaskGroup {
    TaskGroup::new("Containerfile").with_task(
        CommandTask::builder("Lint (hadolint)")
            .args(["hadolint", "--config", "{{ config_file }}"])
            .config_file(toolcfg::HADOLINT)
            .files(CONTAINER_FILES)
            .build(),
    )
}
