//! Project discovery and application metadata from `package.json`.
//!
//! Two layouts are understood:
//!
//! - **two-package**: a development `package.json` at the project root and the
//!   application's own `package.json` in `app/` (or an explicit directory).
//!   Native dependencies of the app are then reinstalled per architecture.
//! - **single-package**: one `package.json` at the project root serves both.

use crate::bundler::{Error, Result, error::ErrorExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Application directory probed when none is given explicitly.
pub const DEFAULT_APP_DIR_NAME: &str = "app";

/// Development dependencies that pin the runtime version, in lookup order.
const RUNTIME_PACKAGES: &[&str] = &["electron-prebuilt", "electron"];

/// Raw `package.json`; every field may be absent.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub author: Option<Author>,
    pub build: Option<Value>,
    pub repository: Option<Repository>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

/// `author` as a plain string or as an object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Name(String),
    Person {
        name: String,
        #[serde(default)]
        email: Option<String>,
    },
}

impl Author {
    /// `Name <email>` form used as maintainer/publisher.
    pub fn display_name(&self) -> String {
        match self {
            Author::Name(name) => name.clone(),
            Author::Person {
                name,
                email: Some(email),
            } => format!("{name} <{email}>"),
            Author::Person { name, email: None } => name.clone(),
        }
    }
}

/// `repository` as a shorthand string or as an object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Repository {
    Url(String),
    Detailed { url: String },
}

impl Repository {
    pub fn url(&self) -> &str {
        match self {
            Repository::Url(url) | Repository::Detailed { url } => url,
        }
    }
}

/// Validated application metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    /// Free-form packager options
    pub build: Map<String, Value>,
    /// Repository reference, from the app or the development package.json
    pub repository: Option<String>,
}

/// A desktop application project on disk.
#[derive(Clone, Debug)]
pub struct AppProject {
    project_dir: PathBuf,
    app_dir: PathBuf,
    app_package_file: PathBuf,
    app_package: PackageJson,
    dev_package_file: PathBuf,
    dev_package: PackageJson,
    two_package_layout: bool,
}

impl AppProject {
    /// Discovers the project layout under `project_dir`.
    ///
    /// An explicit `app_dir` (relative to `project_dir`) must exist; the
    /// default `app/` directory is optional and its absence selects the
    /// single-package layout.
    pub fn load(project_dir: &Path, app_dir: Option<&Path>) -> Result<Self> {
        let (app_dir, required) = match app_dir {
            Some(dir) => (project_dir.join(dir), true),
            None => (project_dir.join(DEFAULT_APP_DIR_NAME), false),
        };

        let app_dir = if app_dir.is_dir() {
            app_dir
        } else if required {
            return Err(Error::config(
                "appDir",
                &app_dir,
                format!("{} doesn't exist", app_dir.display()),
            ));
        } else {
            project_dir.to_path_buf()
        };

        let dev_package_file = project_dir.join("package.json");
        let app_package_file = app_dir.join("package.json");
        let two_package_layout = app_package_file != dev_package_file;

        let dev_package = read_package_json(&dev_package_file)?;
        let app_package = if two_package_layout {
            read_package_json(&app_package_file)?
        } else {
            dev_package.clone()
        };

        if !two_package_layout {
            log::debug!("Single package.json layout at {}", project_dir.display());
        }

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            app_dir,
            app_package_file,
            app_package,
            dev_package_file,
            dev_package,
            two_package_layout,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// The application package.json (the one validated).
    pub fn app_package_file(&self) -> &Path {
        &self.app_package_file
    }

    /// `true` when development and application dependencies are separated.
    pub fn is_two_package_layout(&self) -> bool {
        self.two_package_layout
    }

    /// Root of all build outputs.
    pub fn dist_dir(&self) -> PathBuf {
        self.project_dir.join("dist")
    }

    /// Icons and other build resources.
    pub fn resources_dir(&self) -> PathBuf {
        self.project_dir.join("build")
    }

    /// Checks the required fields in order: name, description, version,
    /// build, author. The first missing one is reported.
    pub fn validate(&self) -> Result<AppMetadata> {
        let path = self.app_package_file.as_path();
        let package = &self.app_package;

        let name = required(&package.name, "name", path)?;
        let description = required(&package.description, "description", path)?;
        let version = required(&package.version, "version", path)?;
        if let Err(e) = semver::Version::parse(&version) {
            return Err(Error::config(
                "version",
                path,
                format!(
                    "Invalid 'version' \"{}\" in the application package.json ('{}'): {}",
                    version,
                    path.display(),
                    e
                ),
            ));
        }

        let build = match &package.build {
            Some(Value::Object(build)) => build.clone(),
            _ => return Err(missing_build(path)),
        };

        let author = package
            .author
            .as_ref()
            .map(Author::display_name)
            .filter(|author| !author.trim().is_empty())
            .ok_or_else(|| Error::missing_field("author", path))?;

        let repository = package
            .repository
            .as_ref()
            .or(self.dev_package.repository.as_ref())
            .map(|repository| repository.url().to_string());

        Ok(AppMetadata {
            name,
            version,
            description,
            author,
            build,
            repository,
        })
    }

    /// Runtime version from the development package.json, without its range
    /// prefix (`^0.36.7` gives `0.36.7`).
    pub fn runtime_version(&self) -> Result<String> {
        RUNTIME_PACKAGES
            .iter()
            .find_map(|package| self.dev_package.dev_dependencies.get(*package))
            .map(|range| {
                range
                    .trim_start_matches(|c: char| !c.is_ascii_digit())
                    .to_string()
            })
            .filter(|version| !version.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "devDependencies",
                    &self.dev_package_file,
                    format!(
                        "Cannot find electron-prebuilt dependency to get electron version in '{}'",
                        self.dev_package_file.display()
                    ),
                )
            })
    }
}

fn required(value: &Option<String>, field: &str, path: &Path) -> Result<String> {
    value
        .as_ref()
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| Error::missing_field(field, path))
}

fn missing_build(path: &Path) -> Error {
    Error::config(
        "build",
        path,
        format!(
            "Please specify 'build' configuration in the application package.json ('{}'), at least\n\n\
             \t\"build\": {{\n\
             \t  \"app-bundle-id\": \"your.id\",\n\
             \t  \"app-category-type\": \"your.app.category.type\"\n\
             \t}}\n\n is required.\n",
            path.display()
        ),
    )
}

fn read_package_json(path: &Path) -> Result<PackageJson> {
    let contents = std::fs::read_to_string(path).fs_context("reading package.json", path)?;
    serde_json::from_str(&contents).map_err(|e| {
        Error::config(
            "package.json",
            path,
            format!("{} is not a valid package.json: {}", path.display(), e),
        )
    })
}
