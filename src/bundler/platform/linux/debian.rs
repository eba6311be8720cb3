//! Debian packages built with `dpkg-deb`.
//!
//! The packed application directory is staged under `/opt/<name>` inside a
//! package root next to it, a `DEBIAN/control` file is written, and the root
//! is turned into `<root>.deb`.

use crate::bundler::{
    Result,
    error::{Error, ErrorExt},
    platform::{DistributableBuilder, DistributableRequest},
    utils::{
        fs,
        process::{ProcessCommand, ProcessRunner, run_checked},
    },
};
use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::json;
use std::{path::PathBuf, sync::Arc};

// A trailing newline is required by dpkg.
const CONTROL_TEMPLATE: &str = "Package: {{package}}
Version: {{version}}
Section: main
Priority: optional
Architecture: {{architecture}}
Essential: no
Maintainer: {{maintainer}}
Description: {{description}}
";

#[derive(Clone)]
pub struct DebBuilder {
    runner: Arc<dyn ProcessRunner>,
}

impl DebBuilder {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DistributableBuilder for DebBuilder {
    async fn package_in_distributable_format(
        &self,
        request: &DistributableRequest<'_>,
    ) -> Result<PathBuf> {
        let metadata = request.metadata;
        let package = metadata.name.to_lowercase();
        let architecture = request.arch.debian_arch();
        let root_name = format!("{}-{}-{}", metadata.name, request.version, architecture);
        let package_dir = request.out_dir.join(&root_name);

        fs::create_dir_all(&package_dir, true).await?;
        fs::copy_dir(
            request.bundle_path,
            &package_dir.join("opt").join(&package),
        )
        .await?;

        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        let control = handlebars
            .render_template(
                CONTROL_TEMPLATE,
                &json!({
                    "package": package,
                    "version": request.version,
                    "architecture": architecture,
                    "maintainer": metadata.author,
                    "description": metadata.description,
                }),
            )
            .map_err(|e| Error::GenericError(format!("failed to render control file: {}", e)))?;

        let control_path = package_dir.join("DEBIAN").join("control");
        fs::create_dir_all(&package_dir.join("DEBIAN"), false).await?;
        tokio::fs::write(&control_path, control)
            .await
            .fs_context("writing control file", &control_path)?;

        log::info!("Building Debian package {}", package_dir.display());
        let command = ProcessCommand::new("dpkg-deb")
            .arg("-b")
            .arg(package_dir.to_string_lossy());
        run_checked(self.runner.as_ref(), &command).await?;

        Ok(request.out_dir.join(format!("{root_name}.deb")))
    }

    fn required_tools(&self) -> &[&'static str] {
        &["dpkg-deb"]
    }
}
