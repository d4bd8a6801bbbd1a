// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Dependency version gate.
//!
//! The build script refuses to build against a Berkeley DB older than 4.8 or a Boost older than 1.55 and prints the
//! soft warnings as cargo warnings. The versions it accepted are compiled into the crate and can be inspected at
//! runtime through [`BuildConfig::detected`].

mod gate;

pub use gate::{Dependency, Diagnostic, Severity, Version};

use log::{error, info, warn};
use thiserror::Error as DeriveError;

#[derive(Debug, DeriveError, Clone, PartialEq, Eq)]
pub enum CompatError {
    #[error("unparsable {dependency} version `{value}`")]
    Unparsable { dependency: Dependency, value: String },

    #[error("{dependency} version {found} is too old - minimum {minimum} required")]
    Unsupported {
        dependency: Dependency,
        found: Version,
        minimum: Version,
    },
}

/// Accepts or rejects `version` of `dependency` and returns the advisory diagnostics for an accepted version.
pub fn gate(dependency: Dependency, version: Version) -> Result<Vec<Diagnostic>, CompatError> {
    gate::diagnose(dependency, version).map_err(|minimum| CompatError::Unsupported {
        dependency,
        found: version,
        minimum,
    })
}

pub fn parse(dependency: Dependency, value: &str) -> Result<Version, CompatError> {
    Version::parse(value).ok_or_else(|| CompatError::Unparsable {
        dependency,
        value: value.to_owned(),
    })
}

pub fn bdb_6_or_later(v: Version) -> bool {
    v.major >= 6
}

pub fn bdb_5_x(v: Version) -> bool {
    v.major == 5
}

pub fn bdb_5_3_or_later(v: Version) -> bool {
    v >= Version::new(5, 3, 0)
}

pub fn bdb_4_x(v: Version) -> bool {
    v.major == 4
}

pub fn boost_1_70_or_later(v: Version) -> bool {
    v >= Version::new(1, 70, 0)
}

pub fn boost_1_80_or_later(v: Version) -> bool {
    v >= Version::new(1, 80, 0)
}

pub fn openssl_3_api(v: Version) -> bool {
    v.major >= 3
}

/// Set for the 1.1.x line only. A 3.x library reports through [`openssl_3_api`] instead.
pub fn openssl_1_1_or_later(v: Version) -> bool {
    v >= Version::new(1, 1, 0) && !openssl_3_api(v)
}

pub fn openssl_legacy(v: Version) -> bool {
    v < Version::new(1, 1, 0)
}

/// The library versions a build was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    pub berkeley_db: Version,
    pub boost: Version,
    pub openssl: Version,
}

impl BuildConfig {
    pub fn new(berkeley_db: Version, boost: Version, openssl: Version) -> Self {
        Self {
            berkeley_db,
            boost,
            openssl,
        }
    }

    /// The versions the build script accepted.
    pub fn detected() -> Result<Self, CompatError> {
        Ok(Self::new(
            parse(Dependency::BerkeleyDb, env!("CORGI_BDB_VERSION"))?,
            parse(Dependency::Boost, env!("CORGI_BOOST_VERSION"))?,
            parse(Dependency::OpenSsl, env!("CORGI_OPENSSL_VERSION"))?,
        ))
    }

    pub fn version(&self, dependency: Dependency) -> Version {
        match dependency {
            Dependency::BerkeleyDb => self.berkeley_db,
            Dependency::Boost => self.boost,
            Dependency::OpenSsl => self.openssl,
        }
    }

    /// Gates every dependency, failing on the first one below its floor.
    pub fn verify(&self) -> Result<Vec<Diagnostic>, CompatError> {
        let mut diagnostics = Vec::new();
        for dependency in Dependency::ALL {
            diagnostics.extend(gate(dependency, self.version(dependency))?);
        }
        Ok(diagnostics)
    }

    pub fn version_lines(&self) -> Vec<String> {
        Dependency::ALL
            .iter()
            .map(|dependency| format!("{} version: {}", dependency, self.version(*dependency)))
            .collect()
    }

    /// Logs the versions and their diagnostics the way the node prints them at startup.
    pub fn log_diagnostics(&self) -> Result<(), CompatError> {
        for line in self.version_lines() {
            info!("{}", line);
        }

        for diagnostic in self.verify()? {
            match diagnostic.severity {
                Severity::Info => info!("{}", diagnostic.message),
                Severity::Notice => warn!("IMPORTANT: {}", diagnostic.message),
                Severity::Warning => warn!("{}", diagnostic.message),
                Severity::Critical => error!("{}", diagnostic.message),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck::quickcheck;

    fn config(bdb: &str, boost: &str, openssl: &str) -> BuildConfig {
        BuildConfig::new(
            Version::parse(bdb).unwrap(),
            Version::parse(boost).unwrap(),
            Version::parse(openssl).unwrap(),
        )
    }

    #[test]
    fn test_gate_rejects_old_versions() {
        assert_eq!(
            gate(Dependency::BerkeleyDb, Version::new(4, 7, 25)),
            Err(CompatError::Unsupported {
                dependency: Dependency::BerkeleyDb,
                found: Version::new(4, 7, 25),
                minimum: Version::new(4, 8, 0),
            })
        );

        let e = gate(Dependency::Boost, Version::new(1, 54, 0)).unwrap_err();
        assert_eq!(e.to_string(), "Boost version 1.54.0 is too old - minimum 1.55.0 required");
    }

    #[test]
    fn test_parse_error() {
        let e = parse(Dependency::OpenSsl, "three").unwrap_err();
        assert_eq!(e.to_string(), "unparsable OpenSSL version `three`");
    }

    #[test]
    fn test_predicates() {
        assert!(bdb_6_or_later(Version::new(6, 2, 32)));
        assert!(!bdb_6_or_later(Version::new(5, 3, 28)));
        assert!(bdb_5_3_or_later(Version::new(5, 3, 0)));
        assert!(!bdb_5_3_or_later(Version::new(5, 1, 29)));
        assert!(boost_1_70_or_later(Version::new(1, 70, 0)));
        assert!(!boost_1_80_or_later(Version::new(1, 79, 0)));
        assert!(openssl_3_api(Version::new(3, 0, 0)));
        assert!(openssl_legacy(Version::parse("1.0.2u").unwrap()));
        assert!(!openssl_legacy(Version::new(1, 1, 0)));
    }

    #[test]
    fn test_version_bands() {
        assert!(bdb_4_x(Version::new(4, 8, 30)));
        assert!(!bdb_4_x(Version::new(5, 0, 32)));
        assert!(bdb_5_x(Version::new(5, 0, 32)));
        assert!(bdb_5_x(Version::new(5, 3, 28)));
        assert!(!bdb_5_x(Version::new(6, 2, 32)));

        assert!(openssl_1_1_or_later(Version::parse("1.1.1w").unwrap()));
        assert!(!openssl_1_1_or_later(Version::new(3, 0, 13)));
        assert!(!openssl_1_1_or_later(Version::parse("1.0.2u").unwrap()));
    }

    #[test]
    fn test_version_lines() {
        assert_eq!(
            config("5.3.28", "1.83.0", "3.0.13").version_lines(),
            vec![
                "Berkeley DB version: 5.3.28",
                "Boost version: 1.83.0",
                "OpenSSL version: 3.0.13"
            ]
        );
    }

    #[test]
    fn test_verify() {
        let diagnostics = config("6.2.32", "1.60.0", "1.1.1").verify().unwrap();

        assert!(diagnostics
            .iter()
            .any(|d| d.dependency == Dependency::Boost && d.severity == Severity::Warning));
        assert_eq!(
            diagnostics
                .iter()
                .filter(|d| d.dependency == Dependency::OpenSsl)
                .count(),
            2
        );

        assert!(config("4.8.30", "1.50.0", "3.0.0").verify().is_err());
    }

    #[test]
    fn test_detected() {
        let detected = BuildConfig::detected().unwrap();

        assert!(detected.verify().is_ok());
        assert!(detected.log_diagnostics().is_ok());
    }

    quickcheck! {
        fn prop_gate_follows_floor(major: u8, minor: u8, patch: u8) -> bool {
            let version = Version::new(major as u32 % 8, minor as u32 % 100, patch as u32);

            Dependency::ALL.iter().all(|dependency| match dependency.minimum() {
                Some(minimum) => gate(*dependency, version).is_ok() == (version >= minimum),
                None => gate(*dependency, version).is_ok(),
            })
        }

        fn prop_predicates_agree_with_gate(minor: u8) -> bool {
            let boost = Version::new(1, 55 + minor as u32 % 40, 0);
            let warned = gate(Dependency::Boost, boost).map(|d| !d.is_empty()).unwrap_or(false);

            warned != boost_1_70_or_later(boost)
        }

        fn prop_openssl_bands_are_exclusive(major: u8, minor: u8) -> bool {
            let v = Version::new(major as u32 % 5, minor as u32 % 3, 0);
            let bands = [openssl_legacy(v), openssl_1_1_or_later(v), openssl_3_api(v)];

            bands.iter().filter(|b| **b).count() == 1
        }

        fn prop_bdb_bands_are_exclusive(major: u8) -> bool {
            let v = Version::new(4 + major as u32 % 4, 8, 0);

            [bdb_4_x(v), bdb_5_x(v), bdb_6_or_later(v)].iter().filter(|b| **b).count() == 1
        }
    }
}
