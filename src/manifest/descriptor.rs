//! Protobuf descriptor sets for the gRPC-JSON transcoder.

use std::path::Path;

use prost::Message;
use prost_types::FileDescriptorSet;
use regex::Regex;

use crate::errors::{Error, Result};

/// Largest descriptor that fits in a Kubernetes custom resource
pub const MAX_DESCRIPTOR_BYTES: usize = 1_000_000;

/// A decoded `FileDescriptorSet` together with its original bytes.
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    bytes: Vec<u8>,
    files: FileDescriptorSet,
}

impl DescriptorSet {
    /// Read and decode a descriptor set file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::config_with_source(
                format!("Failed to read descriptor file '{}'", path.display()),
                Box::new(e),
            )
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let files = FileDescriptorSet::decode(&bytes[..]).map_err(|e| {
            Error::config_with_source("Descriptor is not a valid FileDescriptorSet", Box::new(e))
        })?;
        Ok(Self { bytes, files })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject descriptors above [`MAX_DESCRIPTOR_BYTES`].
    pub fn ensure_deliverable(&self) -> Result<()> {
        if self.bytes.len() > MAX_DESCRIPTOR_BYTES {
            return Err(Error::DescriptorTooLarge {
                size: self.bytes.len(),
                limit: MAX_DESCRIPTOR_BYTES,
            });
        }
        Ok(())
    }

    /// Every service in the set as `package.Service`
    pub fn service_names(&self) -> Vec<String> {
        self.select_services(&[], &[]).unwrap_or_default()
    }

    /// Services whose package starts with one of `packages` and whose name
    /// matches one of `patterns`. Empty filters match everything.
    ///
    /// Invalid patterns are reported together. The result is sorted.
    pub fn select_services(&self, packages: &[String], patterns: &[String]) -> Result<Vec<String>> {
        let mut regexes = Vec::with_capacity(patterns.len());
        let mut invalid = Vec::new();
        for pattern in patterns {
            match Regex::new(pattern) {
                Ok(re) => regexes.push(re),
                Err(e) => invalid.push(format!("'{}': {}", pattern, e)),
            }
        }
        if !invalid.is_empty() {
            return Err(Error::config(format!("Invalid service patterns: {}", invalid.join("; "))));
        }

        let package_matches =
            |package: &str| packages.is_empty() || packages.iter().any(|p| package.starts_with(p.as_str()));
        let service_matches =
            |service: &str| regexes.is_empty() || regexes.iter().any(|re| re.is_match(service));

        let mut selected = Vec::new();
        for file in &self.files.file {
            if !package_matches(file.package()) {
                continue;
            }
            for service in &file.service {
                if service_matches(service.name()) {
                    selected.push(qualified_name(file.package(), service.name()));
                }
            }
        }

        selected.sort();
        selected.dedup();
        Ok(selected)
    }

    /// Entries of `wanted` that the set does not define
    pub fn missing_services<'a>(&self, wanted: &'a [String]) -> Vec<&'a str> {
        let known = self.service_names();
        wanted
            .iter()
            .filter(|name| known.binary_search(*name).is_err())
            .map(String::as_str)
            .collect()
    }
}

fn qualified_name(package: &str, service: &str) -> String {
    if package.is_empty() {
        service.to_string()
    } else {
        format!("{}.{}", package, service)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prost_types::{FileDescriptorProto, ServiceDescriptorProto};
    use std::io::Write;

    pub(crate) fn sample_set() -> FileDescriptorSet {
        let file = |name: &str, package: &str, services: &[&str]| FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            service: services
                .iter()
                .map(|s| ServiceDescriptorProto { name: Some(s.to_string()), ..Default::default() })
                .collect(),
            ..Default::default()
        };

        FileDescriptorSet {
            file: vec![
                file("inventory.proto", "acme.inventory.v1", &["Inventory", "HttpAdmin"]),
                file("echo.proto", "acme.echo", &["Echo"]),
                file("health.proto", "grpc.health.v1", &["Health"]),
            ],
        }
    }

    #[test]
    fn test_lists_all_services_sorted() {
        let set = DescriptorSet::from_bytes(sample_set().encode_to_vec()).unwrap();
        assert_eq!(
            set.service_names(),
            vec![
                "acme.echo.Echo",
                "acme.inventory.v1.HttpAdmin",
                "acme.inventory.v1.Inventory",
                "grpc.health.v1.Health",
            ]
        );
    }

    #[test]
    fn test_filters_by_package_prefix_and_pattern() {
        let set = DescriptorSet::from_bytes(sample_set().encode_to_vec()).unwrap();

        let selected = set.select_services(&["acme".to_string()], &[]).unwrap();
        assert_eq!(selected.len(), 3);

        let selected = set
            .select_services(&["acme".to_string()], &["^Http.*".to_string(), "Echo".to_string()])
            .unwrap();
        assert_eq!(selected, vec!["acme.echo.Echo", "acme.inventory.v1.HttpAdmin"]);
    }

    #[test]
    fn test_reports_every_invalid_pattern() {
        let set = DescriptorSet::from_bytes(sample_set().encode_to_vec()).unwrap();
        let err = set
            .select_services(&[], &["(".to_string(), "ok".to_string(), "[".to_string()])
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("'('"));
        assert!(message.contains("'['"));
    }

    #[test]
    fn test_missing_services() {
        let set = DescriptorSet::from_bytes(sample_set().encode_to_vec()).unwrap();
        let wanted = vec!["acme.echo.Echo".to_string(), "acme.echo.Missing".to_string()];
        assert_eq!(set.missing_services(&wanted), vec!["acme.echo.Missing"]);
    }

    #[test]
    fn test_malformed_descriptor_is_config_error() {
        let err = DescriptorSet::from_bytes(vec![0x0a, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_size_ceiling() {
        let set = DescriptorSet { bytes: vec![0; MAX_DESCRIPTOR_BYTES], files: FileDescriptorSet::default() };
        assert!(set.ensure_deliverable().is_ok());

        let set = DescriptorSet { bytes: vec![0; MAX_DESCRIPTOR_BYTES + 1], files: FileDescriptorSet::default() };
        assert!(matches!(set.ensure_deliverable(), Err(Error::DescriptorTooLarge { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&sample_set().encode_to_vec()).unwrap();

        let set = DescriptorSet::load(file.path()).unwrap();
        assert_eq!(set.service_names().len(), 4);

        let missing = DescriptorSet::load(Path::new("/nonexistent/descriptor.pb")).unwrap_err();
        assert!(matches!(missing, Error::Config { .. }));
    }
}
