//! Ephemeral code signing identities.
//!
//! A signing certificate (`.p12`) is imported into a throwaway keychain for the
//! duration of one build run. The keychain is created with a fixed passphrase,
//! unlocked, and given a one hour lock timeout, so nothing in the user's login
//! keychain is touched and no interactive prompt can appear. Disposal deletes
//! the keychain again; the orchestrator registers that as a cleanup task.

use crate::bundler::{
    Result,
    error::{Error, all_settled, join_failures},
    utils::{
        fs,
        http::Downloader,
        process::{ProcessCommand, ProcessOutput, ProcessRunner, run_checked},
    },
};
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

/// Apple Worldwide Developer Relations intermediate certificate.
pub const ROOT_CERTIFICATE_URL: &str =
    "https://developer.apple.com/certificationauthority/AppleWWDRCA.cer";

/// Passphrase of every ephemeral keychain.
const KEYCHAIN_PASSPHRASE: &str = "kodegen-bundler-desktop";

/// Seconds of inactivity before the ephemeral keychain locks itself.
const KEYCHAIN_LOCK_TIMEOUT: &str = "3600";

/// The only application allowed to use imported keys without prompting.
const CODESIGN: &str = "/usr/bin/codesign";

/// `security` exit status when the keychain does not exist.
const KEYCHAIN_NOT_FOUND_CODE: i32 = 50;

/// Subject line printed by OpenSSL 1.x: `subject=/UID=.../CN=Name/OU=...`
const LEGACY_SUBJECT: &str = r"(?m)^subject=.*?/CN=([^/\n]+)";

/// Subject line printed by OpenSSL 3.x: `subject=UID = ..., CN = Name, OU = ...`
const RFC2253_SUBJECT: &str = r"(?m)^subject\s*=.*?\bCN\s*=\s*([^,\n]+)";

/// A usable signing identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningIdentity {
    common_name: String,
    store_handle: Option<String>,
}

impl SigningIdentity {
    /// Identity already present in the user's default keychains.
    pub fn explicit(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            store_handle: None,
        }
    }

    fn provisioned(common_name: String, store_handle: String) -> Self {
        Self {
            common_name,
            store_handle: Some(store_handle),
        }
    }

    /// Certificate subject common name passed to `codesign --sign`.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Ephemeral keychain holding the identity, `None` for explicit identities.
    pub fn store_handle(&self) -> Option<&str> {
        self.store_handle.as_deref()
    }
}

/// How to treat a keychain that is already gone when disposing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisposeMode {
    /// Missing keychain counts as disposed
    #[default]
    Lenient,
    /// Missing keychain is an error
    Strict,
}

/// Creates, uses and disposes ephemeral signing identities.
pub struct CodeSigningManager {
    runner: Arc<dyn ProcessRunner>,
    downloader: Arc<dyn Downloader>,
    temp_dir: PathBuf,
    root_certificate_url: String,
}

impl CodeSigningManager {
    pub fn new(runner: Arc<dyn ProcessRunner>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            runner,
            downloader,
            temp_dir: std::env::temp_dir(),
            root_certificate_url: ROOT_CERTIFICATE_URL.to_string(),
        }
    }

    /// Directory for the downloaded certificates.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Overrides where the intermediate certificate is fetched from.
    pub fn with_root_certificate_url(mut self, url: impl Into<String>) -> Self {
        self.root_certificate_url = url.into();
        self
    }

    /// Provisions a fresh keychain holding the certificate behind
    /// `signing_link`.
    ///
    /// The downloaded certificate files are always removed. If provisioning
    /// fails after the keychain was created, the keychain is deleted before
    /// the error is returned; every failure met along the way is kept.
    pub async fn create_identity(
        &self,
        signing_link: &str,
        password: &str,
    ) -> Result<SigningIdentity> {
        let store_handle = format!("csc-{}.keychain", Uuid::new_v4().simple());
        let root_certificate = self
            .temp_dir
            .join(format!("{}.cer", Uuid::new_v4().simple()));
        let signing_certificate = self
            .temp_dir
            .join(format!("{}.p12", Uuid::new_v4().simple()));

        log::info!("Creating temporary keychain {}", store_handle);
        let mut keychain_created = false;
        let provisioned = self
            .provision(
                &mut keychain_created,
                &store_handle,
                &root_certificate,
                &signing_certificate,
                signing_link,
                password,
            )
            .await;

        let temp_cleanup = all_settled(
            [
                fs::remove_file(&root_certificate),
                fs::remove_file(&signing_certificate),
            ],
            "Cannot remove downloaded certificates: ",
        )
        .await;

        let (provisioned, temp_cleanup) = match (provisioned, temp_cleanup) {
            (Ok(common_name), Ok(())) => {
                log::info!("Signing identity '{}' ready", common_name);
                return Ok(SigningIdentity::provisioned(common_name, store_handle));
            }
            outcome => outcome,
        };

        let disposal = if keychain_created {
            self.dispose_identity(&store_handle, DisposeMode::Lenient)
                .await
        } else {
            Ok(())
        };
        let mut errors: Vec<Error> = provisioned
            .err()
            .into_iter()
            .chain(temp_cleanup.err())
            .chain(disposal.err())
            .collect();
        Err(match errors.len() {
            1 => errors.remove(0),
            _ => Error::nested("Compound error: ", errors),
        })
    }

    async fn provision(
        &self,
        keychain_created: &mut bool,
        store_handle: &str,
        root_certificate: &Path,
        signing_certificate: &Path,
        signing_link: &str,
        password: &str,
    ) -> Result<String> {
        let (root, signing) = tokio::join!(
            self.downloader
                .download(&self.root_certificate_url, root_certificate),
            self.downloader.download(signing_link, signing_certificate),
        );
        join_failures(
            root.err().into_iter().chain(signing.err()).collect(),
            "Cannot download certificates: ",
        )?;

        let root_certificate = root_certificate.to_string_lossy().into_owned();
        let signing_certificate_arg = signing_certificate.to_string_lossy().into_owned();

        *keychain_created = true;
        let commands = [
            security(["create-keychain", "-p", KEYCHAIN_PASSPHRASE, store_handle]),
            security(["unlock-keychain", "-p", KEYCHAIN_PASSPHRASE, store_handle]),
            security([
                "set-keychain-settings",
                "-t",
                KEYCHAIN_LOCK_TIMEOUT,
                "-u",
                store_handle,
            ]),
            security([
                "import",
                root_certificate.as_str(),
                "-k",
                store_handle,
                "-T",
                CODESIGN,
            ]),
            security([
                "import",
                signing_certificate_arg.as_str(),
                "-k",
                store_handle,
                "-T",
                CODESIGN,
                "-P",
            ])
            .sensitive_arg(password),
        ];
        for command in &commands {
            run_checked(self.runner.as_ref(), command).await?;
        }

        self.extract_common_name(signing_certificate, password)
            .await
    }

    /// Reads the subject common name out of a `.p12` file.
    async fn extract_common_name(&self, certificate: &Path, password: &str) -> Result<String> {
        let command = ProcessCommand::new("openssl")
            .args(["pkcs12", "-nokeys", "-clcerts", "-in"])
            .arg(certificate.to_string_lossy())
            .arg("-passin")
            .sensitive_arg(format!("pass:{password}"));
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(Error::Signing(format!(
                "cannot read certificate subject: {}",
                output.stderr.trim()
            )));
        }

        parse_common_name(&output.stdout)?.ok_or_else(|| {
            Error::Signing("certificate subject has no common name (CN)".to_string())
        })
    }

    /// Signs the bundle at `path` in place.
    pub async fn sign(&self, path: &Path, identity: &SigningIdentity) -> Result<()> {
        log::info!(
            "Signing {} as '{}'",
            path.display(),
            identity.common_name()
        );
        let mut command = ProcessCommand::new("codesign")
            .args(["--deep", "--force", "--sign", identity.common_name()])
            .arg(path.to_string_lossy());
        if let Some(keychain) = identity.store_handle() {
            command = command.args(["--keychain", keychain]);
        }

        let output = self.runner.run(&command).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::Signing(format!(
                "{} could not be signed: {}",
                path.display(),
                output.stderr.trim()
            )))
        }
    }

    /// Deletes an ephemeral keychain.
    pub async fn dispose_identity(&self, store_handle: &str, mode: DisposeMode) -> Result<()> {
        let command = security(["delete-keychain", store_handle]);
        let output = self.runner.run(&command).await?;
        if output.success() {
            log::debug!("Deleted keychain {}", store_handle);
            return Ok(());
        }

        if mode == DisposeMode::Lenient && is_missing_keychain(&output) {
            log::debug!("Keychain {} already gone", store_handle);
            return Ok(());
        }
        output.into_result(&command).map(|_| ())
    }
}

fn security<'a>(args: impl IntoIterator<Item = &'a str>) -> ProcessCommand {
    ProcessCommand::new("security").args(args)
}

fn is_missing_keychain(output: &ProcessOutput) -> bool {
    output.code == Some(KEYCHAIN_NOT_FOUND_CODE) || output.stderr.contains("could not be found")
}

/// Extracts the subject common name from `openssl pkcs12` output.
///
/// Both the slash separated form of OpenSSL 1.x and the comma separated form
/// of OpenSSL 3.x are understood.
pub fn parse_common_name(openssl_output: &str) -> Result<Option<String>> {
    for pattern in [LEGACY_SUBJECT, RFC2253_SUBJECT] {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Signing(format!("invalid subject pattern: {e}")))?;
        if let Some(name) = regex
            .captures(openssl_output)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().trim().to_string())
            .filter(|name| !name.is_empty())
        {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_name_from_legacy_subject() {
        let output = "Bag Attributes\n    friendlyName: Developer ID Application: Acme Inc\n\
            subject=/UID=ABCDE12345/CN=Developer ID Application: Acme Inc (ABCDE12345)/OU=ABCDE12345/O=Acme Inc/C=US\n\
            issuer=/CN=Developer ID Certification Authority/OU=Apple Certification Authority/O=Apple Inc./C=US\n";

        assert_eq!(
            parse_common_name(output).unwrap().as_deref(),
            Some("Developer ID Application: Acme Inc (ABCDE12345)")
        );
    }

    #[test]
    fn common_name_from_rfc2253_subject() {
        let output = "subject=UID = ABCDE12345, CN = Mac Developer: Jane Roe (XYZ), OU = ABCDE12345, O = Jane Roe, C = US\n\
            issuer=CN = Apple Worldwide Developer Relations Certification Authority, OU = G3, O = Apple Inc., C = US\n";

        assert_eq!(
            parse_common_name(output).unwrap().as_deref(),
            Some("Mac Developer: Jane Roe (XYZ)")
        );
    }

    #[test]
    fn missing_subject_yields_none() {
        assert_eq!(parse_common_name("-----BEGIN CERTIFICATE-----\n").unwrap(), None);
    }

    #[test]
    fn missing_keychain_detection() {
        let by_code = ProcessOutput::with_code(KEYCHAIN_NOT_FOUND_CODE);
        let by_message = ProcessOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "security: SecKeychainDelete: The specified keychain could not be found.".into(),
        };

        assert!(is_missing_keychain(&by_code));
        assert!(is_missing_keychain(&by_message));
        assert!(!is_missing_keychain(&ProcessOutput::with_code(1)));
    }
}
