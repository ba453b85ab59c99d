//! Version metadata embedded into the VISCA Game Controller executable.
//!
//! Each release carries one [`VersionDescriptor`]. The build script hands the
//! six string fields to the Windows resource compiler; the rest of the
//! workspace reads the current descriptor for its program name and version.

mod product_version;

use serde::Serialize;
use thiserror::Error;

pub use product_version::{PreRelease, ProductVersion};

/// Target operating system family (`dwFileOS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum FileOs {
    Unknown = 0x0,
    Windows16 = 0x1,
    Windows32 = 0x4,
    Dos = 0x10000,
    Os216 = 0x20000,
    Os232 = 0x30000,
    Nt = 0x40000,
    NtWindows32 = 0x40004,
}

/// Kind of binary (`dwFileType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum FileType {
    Unknown = 0x0,
    App = 0x1,
    Dll = 0x2,
    Driver = 0x3,
    Font = 0x4,
    Vxd = 0x5,
    StaticLib = 0x7,
}

impl FileOs {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl FileType {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// String-table keys in the order the resource compiler receives them.
pub const STRING_KEYS: [&str; 6] = [
    "FileDescription",
    "InternalName",
    "LegalCopyright",
    "OriginalFilename",
    "ProductName",
    "ProductVersion",
];

/// US English.
pub const LANG_EN_US: u16 = 1033;
/// UTF-16.
pub const CODEPAGE_UNICODE: u16 = 1200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    pub file_os: FileOs,
    pub file_type: FileType,
    pub description: &'static str,
    pub internal_name: &'static str,
    pub copyright: &'static str,
    pub original_filename: &'static str,
    pub product_name: &'static str,
    pub product_version: &'static str,
    pub codepage_key: &'static str,
    pub translation: (u16, u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorIssue {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("translation pair is zero")]
    ZeroTranslation,
    #[error("codepage key {key} does not match translation pair ({expected})")]
    CodepageMismatch { key: String, expected: String },
    #[error("malformed product version {0:?}")]
    BadVersion(String),
    #[error("original filename {0:?} does not match the product or internal name")]
    FilenameMismatch(String),
    #[error("copyright {0:?} names no year")]
    MissingCopyrightYear(String),
    #[error("product version went backwards: {previous} -> {next}")]
    VersionRegressed { previous: String, next: String },
    #[error("copyright year went backwards: {previous} -> {next}")]
    CopyrightRegressed { previous: u16, next: u16 },
}

/// Every release in order, oldest first.
pub static RELEASES: [VersionDescriptor; 3] = [
    VersionDescriptor {
        file_os: FileOs::Windows32,
        file_type: FileType::App,
        description: "VISCA Controller",
        internal_name: "viscacontroller",
        copyright: "Copyright (c) 2024, Dan Tappan",
        original_filename: "visca_controller.exe",
        product_name: "viscacontroller",
        product_version: "0.5",
        codepage_key: "040904B0",
        translation: (LANG_EN_US, CODEPAGE_UNICODE),
    },
    VersionDescriptor {
        file_os: FileOs::Windows32,
        file_type: FileType::App,
        description: "VISCA Game Controller",
        internal_name: "viscacontroller",
        copyright: "Copyright (c) 2024, Dan Tappan",
        original_filename: "VISCA-Game-Controller.exe",
        product_name: "viscacontroller",
        product_version: "0.7",
        codepage_key: "040904B0",
        translation: (LANG_EN_US, CODEPAGE_UNICODE),
    },
    VersionDescriptor {
        file_os: FileOs::Windows32,
        file_type: FileType::App,
        description: "VISCA Game Controller",
        internal_name: "viscacontroller",
        copyright: "Copyright (c) 2024,2025, Dan Tappan",
        original_filename: "VISCA-Game-Controller.exe",
        product_name: "viscacontroller",
        product_version: "1.0beta4",
        codepage_key: "040904B0",
        translation: (LANG_EN_US, CODEPAGE_UNICODE),
    },
];

/// The descriptor for the release being built.
pub fn current() -> &'static VersionDescriptor {
    &RELEASES[RELEASES.len() - 1]
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl VersionDescriptor {
    pub fn string_fields(&self) -> [(&'static str, &'static str); 6] {
        [
            (STRING_KEYS[0], self.description),
            (STRING_KEYS[1], self.internal_name),
            (STRING_KEYS[2], self.copyright),
            (STRING_KEYS[3], self.original_filename),
            (STRING_KEYS[4], self.product_name),
            (STRING_KEYS[5], self.product_version),
        ]
    }

    /// String-table key implied by the translation pair, e.g. `040904B0`.
    pub fn translation_key(&self) -> String {
        format!("{:04X}{:04X}", self.translation.0, self.translation.1)
    }

    pub fn version(&self) -> Result<ProductVersion, DescriptorIssue> {
        ProductVersion::parse(self.product_version)
    }

    /// Four-digit years named in the copyright string, in order of appearance.
    pub fn copyright_years(&self) -> Vec<u16> {
        self.copyright
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| run.len() == 4)
            .filter_map(|run| run.parse().ok())
            .collect()
    }

    /// Lowercase alphanumerics of the original filename without its extension.
    pub fn normalized_stem(&self) -> String {
        let stem = self
            .original_filename
            .rsplit_once('.')
            .map_or(self.original_filename, |(stem, _)| stem);
        normalize(stem)
    }

    /// Content checks that apply to a single release.
    pub fn validate(&self) -> Result<(), Vec<DescriptorIssue>> {
        let mut issues: Vec<DescriptorIssue> = self
            .string_fields()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| DescriptorIssue::EmptyField(key))
            .collect();

        if self.codepage_key.trim().is_empty() {
            issues.push(DescriptorIssue::EmptyField("codepage key"));
        }

        if self.translation.0 == 0 || self.translation.1 == 0 {
            issues.push(DescriptorIssue::ZeroTranslation);
        } else if !self.codepage_key.eq_ignore_ascii_case(&self.translation_key()) {
            issues.push(DescriptorIssue::CodepageMismatch {
                key: self.codepage_key.to_string(),
                expected: self.translation_key(),
            });
        }

        if let Err(issue) = self.version() {
            issues.push(issue);
        }

        let stem = self.normalized_stem();
        let names = [self.internal_name, self.product_name, self.description];
        if stem.is_empty() || !names.iter().any(|name| normalize(name) == stem) {
            issues.push(DescriptorIssue::FilenameMismatch(
                self.original_filename.to_string(),
            ));
        }

        if self.copyright_years().is_empty() {
            issues.push(DescriptorIssue::MissingCopyrightYear(
                self.copyright.to_string(),
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Checks each release and the ordering between consecutive releases.
pub fn validate_history(releases: &[VersionDescriptor]) -> Result<(), Vec<DescriptorIssue>> {
    let mut issues = Vec::new();

    for release in releases {
        if let Err(found) = release.validate() {
            issues.extend(found);
        }
    }

    for pair in releases.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);

        if let (Ok(a), Ok(b)) = (previous.version(), next.version()) {
            if b < a {
                issues.push(DescriptorIssue::VersionRegressed {
                    previous: previous.product_version.to_string(),
                    next: next.product_version.to_string(),
                });
            }
        }

        let last_year = |d: &VersionDescriptor| d.copyright_years().into_iter().max();
        if let (Some(a), Some(b)) = (last_year(previous), last_year(next)) {
            if b < a {
                issues.push(DescriptorIssue::CopyrightRegressed {
                    previous: a,
                    next: b,
                });
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
