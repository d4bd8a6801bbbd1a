// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Version rules for the native libraries the node links against.
//!
//! This file is also compiled into the build script, it must only depend on `std`.

use std::fmt::{self, Display, Formatter};

/// A `major.minor.patch` triple. Missing components read as zero and a trailing letter release (`1.0.2k`) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() > 3 {
            return None;
        }

        let mut numbers = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            let digits = part.len() - part.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            let (number, suffix) = part.split_at(digits);

            let last = i == parts.len() - 1;
            if number.is_empty() || !(suffix.is_empty() || (last && suffix.chars().all(|c| c.is_ascii_lowercase()))) {
                return None;
            }

            numbers[i] = number.parse().ok()?;
        }

        Some(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    BerkeleyDb,
    Boost,
    OpenSsl,
}

impl Dependency {
    pub const ALL: [Dependency; 3] = [Dependency::BerkeleyDb, Dependency::Boost, Dependency::OpenSsl];

    pub fn name(&self) -> &'static str {
        match self {
            Dependency::BerkeleyDb => "Berkeley DB",
            Dependency::Boost => "Boost",
            Dependency::OpenSsl => "OpenSSL",
        }
    }

    /// The oldest version the node builds against, if there is a hard floor.
    pub fn minimum(&self) -> Option<Version> {
        match self {
            Dependency::BerkeleyDb => Some(Version::new(4, 8, 0)),
            Dependency::Boost => Some(Version::new(1, 55, 0)),
            Dependency::OpenSsl => None,
        }
    }

    /// The variable the build reads the detected version from.
    pub fn env_var(&self) -> &'static str {
        match self {
            Dependency::BerkeleyDb => "CORGI_BDB_VERSION",
            Dependency::Boost => "CORGI_BOOST_VERSION",
            Dependency::OpenSsl => "CORGI_OPENSSL_VERSION",
        }
    }

    pub fn default_version(&self) -> &'static str {
        match self {
            Dependency::BerkeleyDb => "5.3.28",
            Dependency::Boost => "1.83.0",
            Dependency::OpenSsl => "3.0.13",
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `Notice` is shown at startup only, `Warning` and above are also reported when building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Notice => "IMPORTANT",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub dependency: Dependency,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn is_build_warning(&self) -> bool {
        self.severity >= Severity::Warning
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

struct Report {
    dependency: Dependency,
    diagnostics: Vec<Diagnostic>,
}

impl Report {
    fn new(dependency: Dependency) -> Self {
        Self {
            dependency,
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, severity: Severity, message: &str) {
        self.diagnostics.push(Diagnostic {
            dependency: self.dependency,
            severity,
            message: message.to_owned(),
        });
    }
}

/// Checks `version` of `dependency`. Returns the diagnostics to show, or the required minimum if the version is
/// below the floor.
pub fn diagnose(dependency: Dependency, version: Version) -> Result<Vec<Diagnostic>, Version> {
    if let Some(minimum) = dependency.minimum() {
        if version < minimum {
            return Err(minimum);
        }
    }

    let mut report = Report::new(dependency);
    match dependency {
        Dependency::BerkeleyDb => berkeley_db(&mut report, version),
        Dependency::Boost => boost(&mut report, version),
        Dependency::OpenSsl => openssl(&mut report, version),
    }

    Ok(report.diagnostics)
}

fn berkeley_db(report: &mut Report, v: Version) {
    use Severity::*;

    match (v.major, v.minor) {
        (6.., _) => {
            report.push(Info, "Using Berkeley DB 6.x - latest stable API");
            report.push(Notice, "Berkeley DB 6.x can read wallet files from BDB 4.8/5.x");
            report.push(Notice, "Wallet files may not be readable by older BDB versions after modification");
            report.push(Notice, "ALWAYS backup your wallet before upgrading Berkeley DB!");
        }
        (5, 3..) => report.push(Info, "Using Berkeley DB 5.3+ - recommended version"),
        (5, 0) => {
            report.push(Warning, "Berkeley DB 5.0.x uses AGPL license!");
            report.push(Warning, "Consider using 4.8.x, 5.1+, or 6.x for licensing compatibility");
        }
        (4, _) => report.push(Info, "Using Berkeley DB 4.8+ - stable and widely used"),
        _ => report.push(Notice, "Using older Berkeley DB version - upgrade recommended"),
    }

    if v.major == 5 {
        report.push(Info, "Using Berkeley DB 5.x - compatible with 4.8.x wallet files");
    }

    report.push(Info, "Wallet files should be backed up before any BDB version change");
}

fn boost(report: &mut Report, v: Version) {
    if v < Version::new(1, 70, 0) {
        report.push(
            Severity::Warning,
            "Boost version < 1.70 detected - consider upgrading for C++11/14/17 support",
        );
    }
}

fn openssl(report: &mut Report, v: Version) {
    use Severity::*;

    if v < Version::new(1, 1, 0) {
        report.push(Critical, "OpenSSL 1.0.x detected - CRITICAL SECURITY RISK");
        report.push(Critical, "This version contains Heartbleed and other vulnerabilities");
        report.push(Critical, "Upgrade to OpenSSL 3.0+ immediately");
    } else if v < Version::new(3, 0, 0) {
        report.push(Warning, "OpenSSL version < 3.0 detected - please consider upgrading");
        report.push(Warning, "OpenSSL 1.1.x will reach end-of-life soon");
    }
}
