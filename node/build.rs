// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#[allow(dead_code)]
#[path = "src/compat/gate.rs"]
mod gate;

use gate::{diagnose, Dependency, Version};

use std::env;

fn main() {
    for dependency in Dependency::ALL {
        println!("cargo:rerun-if-env-changed={}", dependency.env_var());

        let value = env::var(dependency.env_var()).unwrap_or_else(|_| dependency.default_version().to_owned());
        let value = value.trim();

        let version = Version::parse(value)
            .unwrap_or_else(|| panic!("unparsable {} version `{}` in {}", dependency, value, dependency.env_var()));

        match diagnose(dependency, version) {
            Ok(diagnostics) => {
                for diagnostic in diagnostics.iter().filter(|d| d.is_build_warning()) {
                    println!("cargo:warning={}", diagnostic);
                }
            }
            Err(minimum) => panic!("{} version {} is too old - minimum {} required", dependency, version, minimum),
        }

        println!("cargo:rustc-env={}={}", dependency.env_var(), value);
    }
}
