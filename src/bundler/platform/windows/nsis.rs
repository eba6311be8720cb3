//! NSIS installer creation.
//!
//! Renders an NSI script for the packed application directory and compiles it
//! with `makensis` into `<out>/<arch>/<name>Setup.exe`.

use crate::bundler::{
    Result,
    error::{Error, ErrorExt},
    platform::{DistributableBuilder, DistributableRequest},
    utils::process::{ProcessCommand, ProcessRunner, run_checked},
};
use async_trait::async_trait;
use handlebars::Handlebars;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::io::AsyncWriteExt;

const NSI_TEMPLATE: &str = r#"Unicode true
SetCompressor /SOLID lzma
RequestExecutionLevel user

!define PRODUCT_NAME "{{product_name}}"
!define UNINSTALL_KEY "Software\Microsoft\Windows\CurrentVersion\Uninstall\{{product_name}}"

Name "${PRODUCT_NAME}"
OutFile "{{output_file}}"
InstallDir "$LOCALAPPDATA\Programs\{{product_name}}"
{{#if installer_icon}}
Icon "{{installer_icon}}"
UninstallIcon "{{installer_icon}}"
{{/if}}

VIProductVersion "{{version_nsis}}"
VIAddVersionKey "ProductName" "{{product_name}}"
VIAddVersionKey "CompanyName" "{{publisher}}"
VIAddVersionKey "FileDescription" "{{description}}"
VIAddVersionKey "FileVersion" "{{version}}"
VIAddVersionKey "ProductVersion" "{{version}}"

Page instfiles
UninstPage uninstConfirm
UninstPage instfiles

Section "Install"
  SetOutPath "$INSTDIR"
  File /r "{{source_dir}}\*.*"
  WriteUninstaller "$INSTDIR\Uninstall.exe"
  CreateShortCut "$SMPROGRAMS\{{product_name}}.lnk" "$INSTDIR\{{product_name}}.exe"
  CreateShortCut "$DESKTOP\{{product_name}}.lnk" "$INSTDIR\{{product_name}}.exe"
  WriteRegStr HKCU "${UNINSTALL_KEY}" "DisplayName" "{{product_name}}"
  WriteRegStr HKCU "${UNINSTALL_KEY}" "DisplayVersion" "{{version}}"
  WriteRegStr HKCU "${UNINSTALL_KEY}" "Publisher" "{{publisher}}"
  WriteRegStr HKCU "${UNINSTALL_KEY}" "UninstallString" "$INSTDIR\Uninstall.exe"
SectionEnd

Section "Uninstall"
  Delete "$SMPROGRAMS\{{product_name}}.lnk"
  Delete "$DESKTOP\{{product_name}}.lnk"
  RMDir /r "$INSTDIR"
  DeleteRegKey HKCU "${UNINSTALL_KEY}"
SectionEnd
"#;

/// Builds a per-user NSIS installer with `makensis`.
#[derive(Clone)]
pub struct NsisBuilder {
    runner: Arc<dyn ProcessRunner>,
}

impl NsisBuilder {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DistributableBuilder for NsisBuilder {
    async fn package_in_distributable_format(
        &self,
        request: &DistributableRequest<'_>,
    ) -> Result<PathBuf> {
        let name = &request.metadata.name;
        let arch_dir = request.out_dir.join(request.arch.as_str());
        tokio::fs::create_dir_all(&arch_dir)
            .await
            .fs_context("creating NSIS output directory", &arch_dir)?;

        let installer_path = arch_dir.join(format!("{name}Setup.exe"));
        let icon = request.resources_dir.join("icon.ico");
        let script = render_script(
            request,
            &installer_path,
            icon.is_file().then_some(icon.as_path()),
        )?;
        let nsi_path = arch_dir.join("installer.nsi");
        write_utf8_bom(&nsi_path, &script).await?;

        log::info!("Running makensis for {}", request.arch);
        let command = ProcessCommand::new("makensis")
            .args(["-V3", "-INPUTCHARSET", "UTF8", "-OUTPUTCHARSET", "UTF8"])
            .arg(nsi_path.to_string_lossy());
        run_checked(self.runner.as_ref(), &command).await?;

        Ok(installer_path)
    }

    fn required_tools(&self) -> &[&'static str] {
        &["makensis"]
    }
}

fn render_script(
    request: &DistributableRequest<'_>,
    installer_path: &Path,
    installer_icon: Option<&Path>,
) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    let metadata = request.metadata;
    let mut data = BTreeMap::new();
    data.insert("product_name", metadata.name.clone());
    data.insert("version", request.version.to_string());
    data.insert("version_nsis", format_version_for_nsis(&metadata.version));
    data.insert("publisher", metadata.author.clone());
    data.insert("description", metadata.description.clone());
    data.insert("source_dir", request.bundle_path.display().to_string());
    data.insert("output_file", installer_path.display().to_string());
    if let Some(icon) = installer_icon {
        data.insert("installer_icon", icon.display().to_string());
    }

    handlebars
        .render_template(NSI_TEMPLATE, &data)
        .map_err(|e| Error::GenericError(format!("failed to render NSI template: {}", e)))
}

/// `VIProductVersion` wants exactly four numeric parts.
fn format_version_for_nsis(version: &str) -> String {
    let mut parts: Vec<&str> = version
        .split(['.', '-', '+'])
        .take(3)
        .collect();
    parts.resize(4, "0");
    parts.join(".")
}

/// NSIS reads scripts as UTF-8 only with a byte order mark.
async fn write_utf8_bom(path: &Path, content: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .fs_context("creating NSI script file", path)?;
    file.write_all(&[0xEF, 0xBB, 0xBF])
        .await
        .fs_context("writing UTF-8 BOM", path)?;
    file.write_all(content.as_bytes())
        .await
        .fs_context("writing NSI content", path)?;
    file.flush().await.fs_context("flushing NSI file", path)
}
