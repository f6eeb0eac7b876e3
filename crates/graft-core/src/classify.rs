//! Import classification
//!
//! Maps a raw import string onto a typed [`Import`]. Rules are checked in
//! order and the first match wins:
//!
//! 1. the target package has a descriptor: application-local;
//!    an add-on file importing its own package stays an add-on file;
//! 2. the importee carries a `scheme:` prefix: custom scheme (`addon:` is the
//!    add-on file scheme);
//! 3. the importer's manifest (a descriptor's, or a resolved add-on's) declares
//!    the target: bare dependency;
//! 4. anything else is unresolvable.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{LinkError, Result};
use crate::model::{Descriptors, Import, ImportKind, PackageManifest, package_name_of};

/// Scheme tag for add-on files referenced outside the descriptor set.
pub const ADDON_SCHEME: &str = "addon";

static SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*):(.+)$").expect("scheme pattern is valid")
});

/// Classify `importee`, requested by `importer` (a file or package name), as
/// an import into `target_package`.
pub fn classify(
    descriptors: &Descriptors,
    target_package: &str,
    importee: &str,
    importer: &str,
) -> Result<Import> {
    classify_with_addons(descriptors, &BTreeMap::new(), target_package, importee, importer)
}

/// [`classify`], also knowing the manifests of add-ons resolved so far, so
/// that imports made by add-on files resolve like those of described packages.
pub fn classify_with_addons(
    descriptors: &Descriptors,
    addons: &BTreeMap<String, PackageManifest>,
    target_package: &str,
    importee: &str,
    importer: &str,
) -> Result<Import> {
    let importer_package = package_name_of(importer);

    if let Some(descriptor) = descriptors.get(target_package) {
        let importee = split_scheme(importee).map_or(importee, |(_, name)| name);
        let qualified = format!("{}/{}", descriptor.package_name, importee);
        let name = if !descriptor.has_file(importee) && descriptor.has_file(&qualified) {
            qualified
        } else {
            importee.to_string()
        };
        return Ok(Import::new(importer, importer_package, target_package, name, ImportKind::App));
    }

    if target_package == importer_package && addons.contains_key(importer_package) {
        return Ok(Import::new(
            importer,
            importer_package,
            target_package,
            importee,
            ImportKind::Addon,
        ));
    }

    if let Some((tag, name)) = split_scheme(importee) {
        let package = scheme_package(name, importer_package);
        let kind = if tag == ADDON_SCHEME {
            ImportKind::Addon
        } else {
            ImportKind::Scheme(tag.to_string())
        };
        return Ok(Import::new(importer, importer_package, package, name, kind));
    }

    let addon_declares = addons
        .get(importer_package)
        .is_some_and(|manifest| manifest.declares(target_package));
    if addon_declares || declares(descriptors, importer_package, target_package) {
        return Ok(Import::new(
            importer,
            importer_package,
            target_package,
            importee,
            ImportKind::Bare,
        ));
    }

    Err(LinkError::UnresolvableImport {
        importee: importee.to_string(),
        importer: importer.to_string(),
        package: importer_package.to_string(),
    })
}

/// `npm:qunit` -> `("npm", "qunit")`.
pub fn split_scheme(importee: &str) -> Option<(&str, &str)> {
    let captures = SCHEME.captures(importee)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Package named by the part after the scheme. Scoped names win over the
/// `/tests` fallback, which attributes test modules to the importer.
fn scheme_package(name: &str, importer_package: &str) -> String {
    if name.starts_with('@') {
        package_name_of(name).to_string()
    } else if name.contains("/tests") {
        importer_package.to_string()
    } else {
        package_name_of(name).to_string()
    }
}

/// Test suites inherit the declarations of the package they are merged into.
fn declares(descriptors: &Descriptors, importer_package: &str, target: &str) -> bool {
    let Some(descriptor) = descriptors.get(importer_package) else {
        return false;
    };
    descriptor.pkg.declares(target)
        || descriptor
            .parent
            .as_deref()
            .and_then(|parent| descriptors.get(parent))
            .is_some_and(|parent| parent.pkg.declares(target))
}
