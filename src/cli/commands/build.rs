//! `build`: pack, sign, build installers and optionally publish.

use crate::bundler::{
    Arch, BuildArtifact, BuildOptions, BuildOptionsBuilder, Bundler, PublishSettings,
};
use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use crate::metadata::AppProject;
use tokio_util::sync::CancellationToken;

/// Runs the build pipeline described by `args` and prints the produced artifacts.
pub async fn execute(args: &BuildArgs, cancel: CancellationToken) -> Result<i32> {
    let archs = args
        .architectures()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let project = AppProject::load(&args.project_dir, args.app_dir.as_deref())?;
    let options = options_from_args(args, archs);

    log::info!(
        "Building {} for {} ({})",
        project.app_dir().display(),
        options.platform(),
        options
            .resolved_archs()
            .iter()
            .map(|arch| arch.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let bundler = Bundler::with_defaults(options, project, cancel)?;
    let artifacts = bundler.build().await?;
    print_artifacts(&artifacts);
    Ok(0)
}

fn options_from_args(args: &BuildArgs, archs: Option<Vec<Arch>>) -> BuildOptions {
    let mut builder = BuildOptionsBuilder::new()
        .produce_distributable(args.dist)
        .publish(args.publish)
        .publish_settings(PublishSettings {
            token: args.github_token.clone(),
            repository: args.repository.clone(),
            api_url: args.github_api_url.clone(),
        });

    if let Some(platform) = args.platform {
        builder = builder.platform(platform);
    }
    if let Some(archs) = archs {
        builder = builder.architectures(archs);
    }
    if let (Some(link), Some(password)) = (&args.csc_link, &args.csc_key_password) {
        builder = builder.signing_material(link, password);
    }
    if let Some(identity) = &args.sign {
        builder = builder.explicit_signing_identity(identity);
    }
    if let Some(number) = args.resolved_build_number() {
        builder = builder.build_number(number);
    }

    builder.build()
}

fn print_artifacts(artifacts: &[BuildArtifact]) {
    if artifacts.is_empty() {
        println!("No artifacts produced");
        return;
    }

    println!("Artifacts:");
    for artifact in artifacts {
        println!(
            "  {} ({}, {} bytes, sha256 {})",
            artifact.path.display(),
            artifact.arch,
            artifact.size,
            artifact.checksum
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::Platform;
    use crate::cli::{Args, Command};
    use clap::Parser;

    fn build_args(argv: &[&str]) -> BuildArgs {
        let mut full = vec!["kodegen_bundler_desktop", "build"];
        full.extend_from_slice(argv);
        match Args::try_parse_from(full).unwrap().command {
            Command::Build(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn publish_turns_on_distributables() {
        let args = build_args(&["--platform", "linux", "--publish", "--build-number", "7"]);
        let options = options_from_args(&args, args.architectures().unwrap());

        assert_eq!(options.platform(), Platform::Linux);
        assert!(options.produce_distributable());
        assert!(options.publish());
        assert_eq!(options.build_number(), Some("7"));
    }

    #[test]
    fn explicit_archs_reach_the_options() {
        let args = build_args(&["--platform", "win32", "--arch", "ia32"]);
        let options = options_from_args(&args, args.architectures().unwrap());
        assert_eq!(options.resolved_archs(), vec![Arch::Ia32]);
    }
}
