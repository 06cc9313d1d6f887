//! Container image references
//!
//! Images are built from the Installation's registry settings. When an
//! ImageSet for the installed variant exists, images are pinned by digest
//! instead of tag, and the ImageSet must list every image a component uses.

use tigera_common::crd::{ImageSet, ProductVariant};
use tigera_common::{Error, Result};

/// Registry used when the Installation does not set one
pub const DEFAULT_REGISTRY: &str = "quay.io/";

/// Release the default image tags belong to; also names the ImageSet
pub const RELEASE_VERSION: &str = "v3.18.0";

/// An image the operator deploys
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentImage {
    /// Image path without registry or tag (e.g., "tigera/voltron")
    pub image: &'static str,
    /// Default tag
    pub version: &'static str,
}

/// Manager web console
pub const MANAGER: ComponentImage = ComponentImage {
    image: "tigera/cnx-manager",
    version: RELEASE_VERSION,
};

/// Voltron proxy and tunnel server
pub const VOLTRON: ComponentImage = ComponentImage {
    image: "tigera/voltron",
    version: RELEASE_VERSION,
};

/// Elasticsearch proxy
pub const ES_PROXY: ComponentImage = ComponentImage {
    image: "tigera/es-proxy",
    version: RELEASE_VERSION,
};

/// Compliance controller
pub const COMPLIANCE_CONTROLLER: ComponentImage = ComponentImage {
    image: "tigera/compliance-controller",
    version: RELEASE_VERSION,
};

/// Compliance reporter
pub const COMPLIANCE_REPORTER: ComponentImage = ComponentImage {
    image: "tigera/compliance-reporter",
    version: RELEASE_VERSION,
};

/// Compliance API server
pub const COMPLIANCE_SERVER: ComponentImage = ComponentImage {
    image: "tigera/compliance-server",
    version: RELEASE_VERSION,
};

/// Compliance snapshotter
pub const COMPLIANCE_SNAPSHOTTER: ComponentImage = ComponentImage {
    image: "tigera/compliance-snapshotter",
    version: RELEASE_VERSION,
};

/// CIS benchmarker
pub const COMPLIANCE_BENCHMARKER: ComponentImage = ComponentImage {
    image: "tigera/compliance-benchmarker",
    version: RELEASE_VERSION,
};

/// Every image an ImageSet may pin
pub const ALL_IMAGES: &[ComponentImage] = &[
    MANAGER,
    VOLTRON,
    ES_PROXY,
    COMPLIANCE_CONTROLLER,
    COMPLIANCE_REPORTER,
    COMPLIANCE_SERVER,
    COMPLIANCE_SNAPSHOTTER,
    COMPLIANCE_BENCHMARKER,
];

/// Registry settings from the Installation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageSettings {
    /// Registry with trailing slash; [`DEFAULT_REGISTRY`] when unset
    pub registry: Option<String>,
    /// Replaces the path part of the image (e.g., "mirror/calico")
    pub image_path: Option<String>,
    /// Prepended to the image name
    pub image_prefix: Option<String>,
}

impl ImageSettings {
    /// Settings with only a registry
    pub fn with_registry(registry: impl Into<String>) -> Self {
        Self {
            registry: Some(registry.into()),
            ..Default::default()
        }
    }
}

/// Full image reference for `image`
///
/// With an ImageSet, the image must be listed in it and is referenced by
/// digest; otherwise the default tag is used.
pub fn construct_image(
    image: &ComponentImage,
    settings: &ImageSettings,
    image_set: Option<&ImageSet>,
) -> Result<String> {
    let registry = match settings.registry.as_deref() {
        None | Some("") => DEFAULT_REGISTRY.to_string(),
        Some(r) if r.ends_with('/') => r.to_string(),
        Some(r) => format!("{r}/"),
    };

    let (path, name) = match image.image.rsplit_once('/') {
        Some((path, name)) => (path, name),
        None => ("", image.image),
    };
    let path = match settings.image_path.as_deref() {
        Some(p) if !p.is_empty() => p.trim_end_matches('/'),
        _ => path,
    };
    let prefix = settings.image_prefix.as_deref().unwrap_or_default();
    let reference = if path.is_empty() {
        format!("{registry}{prefix}{name}")
    } else {
        format!("{registry}{path}/{prefix}{name}")
    };

    match image_set {
        None => Ok(format!("{reference}:{}", image.version)),
        Some(set) => set
            .digest_for(image.image)
            .map(|digest| format!("{reference}@{digest}"))
            .ok_or_else(|| {
                Error::validation_for(
                    format!("ImageSet/{}", set.metadata.name.as_deref().unwrap_or_default()),
                    format!("ImageSet did not contain image {}", image.image),
                )
            }),
    }
}

/// Check that an ImageSet only pins known images with sha256 digests
pub fn validate_image_set(set: &ImageSet) -> Result<()> {
    let resource = format!("ImageSet/{}", set.metadata.name.as_deref().unwrap_or_default());
    for entry in &set.spec.images {
        if !ALL_IMAGES.iter().any(|i| i.image == entry.image) {
            return Err(Error::validation_for(
                &resource,
                format!("unexpected image {} in ImageSet", entry.image),
            ));
        }
        if !is_sha256_digest(&entry.digest) {
            return Err(Error::validation_for(
                &resource,
                format!("digest {:?} for image {} is not a sha256 digest", entry.digest, entry.image),
            ));
        }
    }
    Ok(())
}

fn is_sha256_digest(digest: &str) -> bool {
    digest
        .strip_prefix("sha256:")
        .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Name of the ImageSet that applies to `variant`
pub fn image_set_name(variant: ProductVariant) -> String {
    format!("{}-{RELEASE_VERSION}", variant.image_set_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tigera_common::crd::{ImageDigest, ImageSetSpec};

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn image_set(images: &[(&str, &str)]) -> ImageSet {
        ImageSet::new(
            "enterprise-v3.18.0",
            ImageSetSpec {
                images: images
                    .iter()
                    .map(|(image, digest)| ImageDigest {
                        image: image.to_string(),
                        digest: digest.to_string(),
                    })
                    .collect(),
            },
        )
    }

    #[rstest]
    #[case(ImageSettings::default(), "quay.io/tigera/voltron:v3.18.0")]
    #[case(ImageSettings::with_registry("registry.corp"), "registry.corp/tigera/voltron:v3.18.0")]
    #[case(
        ImageSettings { image_path: Some("mirror".into()), ..Default::default() },
        "quay.io/mirror/voltron:v3.18.0"
    )]
    #[case(
        ImageSettings {
            registry: Some("r.io/".into()),
            image_path: Some("a/b/".into()),
            image_prefix: Some("ee-".into()),
        },
        "r.io/a/b/ee-voltron:v3.18.0"
    )]
    fn tagged_references(#[case] settings: ImageSettings, #[case] expected: &str) {
        assert_eq!(construct_image(&VOLTRON, &settings, None).unwrap(), expected);
    }

    #[test]
    fn image_set_pins_digest() {
        let set = image_set(&[("tigera/voltron", DIGEST)]);
        let image = construct_image(&VOLTRON, &ImageSettings::default(), Some(&set)).unwrap();
        assert_eq!(image, format!("quay.io/tigera/voltron@{DIGEST}"));
    }

    #[test]
    fn image_missing_from_image_set_is_an_error() {
        let set = image_set(&[("tigera/voltron", DIGEST)]);
        let err = construct_image(&MANAGER, &ImageSettings::default(), Some(&set)).unwrap_err();
        assert!(err.to_string().contains("did not contain image tigera/cnx-manager"));
    }

    #[rstest]
    #[case(&[("tigera/voltron", DIGEST)], true)]
    #[case(&[("tigera/not-an-image", DIGEST)], false)]
    #[case(&[("tigera/voltron", "sha256:abc")], false)]
    #[case(&[("tigera/voltron", "v3.18.0")], false)]
    fn image_set_validation(#[case] images: &[(&str, &str)], #[case] valid: bool) {
        assert_eq!(validate_image_set(&image_set(images)).is_ok(), valid);
    }

    #[test]
    fn image_set_names() {
        assert_eq!(
            image_set_name(ProductVariant::TigeraSecureEnterprise),
            "enterprise-v3.18.0"
        );
        assert_eq!(image_set_name(ProductVariant::Calico), "calico-v3.18.0");
    }
}
