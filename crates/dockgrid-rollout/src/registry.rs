//! Registry resolution for image references.

use dockgrid_state::{RegistryCredentials, Service, StateResult, StateStore};

/// Registry used for images without an explicit registry host.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Registry host an image is pulled from.
///
/// The first path segment is a registry host when it looks like one
/// (contains a `.` or a `:`); otherwise the image lives on the default
/// public registry, either bare or under a namespace.
pub fn registry_name(image: &str) -> &str {
    let Some((first, _)) = image.split_once('/') else {
        return DEFAULT_REGISTRY;
    };
    if first.contains('.') || first.contains(':') {
        first
    } else {
        DEFAULT_REGISTRY
    }
}

/// Grid-scoped credentials for the registry of `service.image`.
///
/// `None` means an anonymous pull.
pub fn creds_for_registry(
    state: &StateStore,
    service: &Service,
) -> StateResult<Option<RegistryCredentials>> {
    state.find_registry(&service.grid, registry_name(&service.image))
}
