// SPDX-License-Identifier: MPL-2.0

//! A synchronous, cached view over the asynchronous container provider.
//!
//! The solver is single-threaded; the only concurrency in the crate lives
//! here. Background prefetches run on worker threads and publish into the
//! shared cache under one mutex paired with one condition variable, so at
//! most one fetch per package is ever in flight.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, warn};

use crate::{Container, ContainerProvider, Map, PackageReference, ProviderError, Set};

type FetchResult = Result<Arc<dyn Container>, ProviderError>;

#[derive(Default)]
struct GatewayState {
    fetched: Map<PackageReference, FetchResult>,
    inflight: Set<PackageReference>,
}

struct GatewayShared {
    state: Mutex<GatewayState>,
    available: Condvar,
}

/// Cached, serialized access to package containers.
pub(crate) struct ContainerGateway<P: ContainerProvider> {
    provider: Arc<P>,
    skip_update: bool,
    shared: Arc<GatewayShared>,
}

impl<P: ContainerProvider> ContainerGateway<P> {
    pub(crate) fn new(provider: Arc<P>, skip_update: bool) -> Self {
        Self {
            provider,
            skip_update,
            shared: Arc::new(GatewayShared {
                state: Mutex::new(GatewayState::default()),
                available: Condvar::new(),
            }),
        }
    }

    /// The container for a package, fetching it if needed.
    ///
    /// Blocks while another caller or a prefetch worker is already fetching
    /// the same package, then serves the published result.
    pub(crate) fn get(&self, package: &PackageReference) -> FetchResult {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(result) = state.fetched.get(package) {
                return result.clone();
            }
            if !state.inflight.contains(package) {
                break;
            }
            state = self.shared.available.wait(state).unwrap();
        }
        state.inflight.insert(package.clone());
        drop(state);

        debug!("fetching container for {}", package);
        let result = self.provider.get_container(package, self.skip_update);
        if let Err(error) = &result {
            warn!("container fetch for {} failed: {}", package, error);
        }

        let mut state = self.shared.state.lock().unwrap();
        state.inflight.remove(package);
        state.fetched.insert(package.clone(), result.clone());
        self.shared.available.notify_all();
        result
    }

    /// The container for a package only if a fetch already completed.
    pub(crate) fn get_cached(&self, package: &PackageReference) -> Option<FetchResult> {
        let state = self.shared.state.lock().unwrap();
        state.fetched.get(package).cloned()
    }

    /// Start fetching containers in the background, fire and forget.
    /// Completions populate the cache and wake anyone blocked in
    /// [`ContainerGateway::get`].
    pub(crate) fn prefetch(&self, packages: impl IntoIterator<Item = PackageReference>) {
        for package in packages {
            {
                let mut state = self.shared.state.lock().unwrap();
                if state.fetched.contains_key(&package) || state.inflight.contains(&package) {
                    continue;
                }
                state.inflight.insert(package.clone());
            }

            debug!("prefetching container for {}", package);
            let provider = Arc::clone(&self.provider);
            let shared = Arc::clone(&self.shared);
            let skip_update = self.skip_update;
            thread::spawn(move || {
                let result = provider.get_container(&package, skip_update);
                let mut state = shared.state.lock().unwrap();
                state.inflight.remove(&package);
                state.fetched.insert(package, result);
                shared.available.notify_all();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::{Constraint, Version};

    /// Serves empty containers, counting fetches and optionally stalling to
    /// widen race windows.
    struct CountingProvider {
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(delay: Duration) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                delay,
            }
        }
    }

    struct EmptyContainer(PackageReference);

    impl Container for EmptyContainer {
        fn identifier(&self) -> PackageReference {
            self.0.clone()
        }
        fn versions(&self, _filter: &dyn Fn(&Version) -> bool) -> Vec<Version> {
            Vec::new()
        }
        fn dependencies(&self, _version: &Version) -> Result<Vec<Constraint>, ProviderError> {
            Ok(Vec::new())
        }
        fn revision_dependencies(&self, _revision: &str) -> Result<Vec<Constraint>, ProviderError> {
            Ok(Vec::new())
        }
        fn unversioned_dependencies(&self) -> Result<Vec<Constraint>, ProviderError> {
            Ok(Vec::new())
        }
    }

    impl ContainerProvider for CountingProvider {
        fn get_container(
            &self,
            package: &PackageReference,
            _skip_update: bool,
        ) -> Result<Arc<dyn Container>, ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if package.identity() == "broken" {
                return Err(ProviderError::new("checkout failed"));
            }
            Ok(Arc::new(EmptyContainer(package.clone())))
        }
    }

    #[test]
    fn repeated_gets_fetch_once() {
        let provider = Arc::new(CountingProvider::new(Duration::ZERO));
        let gateway = ContainerGateway::new(Arc::clone(&provider), false);
        let a = PackageReference::remote("a");

        assert!(gateway.get_cached(&a).is_none());
        gateway.get(&a).unwrap();
        gateway.get(&a).unwrap();
        assert!(gateway.get_cached(&a).is_some());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_are_cached_too() {
        let provider = Arc::new(CountingProvider::new(Duration::ZERO));
        let gateway = ContainerGateway::new(Arc::clone(&provider), false);
        let broken = PackageReference::remote("broken");

        assert!(gateway.get(&broken).is_err());
        assert!(gateway.get(&broken).is_err());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_gets_share_one_fetch() {
        let provider = Arc::new(CountingProvider::new(Duration::from_millis(50)));
        let gateway = Arc::new(ContainerGateway::new(Arc::clone(&provider), false));
        let a = PackageReference::remote("a");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gateway = Arc::clone(&gateway);
                let a = a.clone();
                thread::spawn(move || gateway.get(&a).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prefetch_populates_the_cache() {
        let provider = Arc::new(CountingProvider::new(Duration::from_millis(10)));
        let gateway = ContainerGateway::new(Arc::clone(&provider), false);
        let packages = [PackageReference::remote("a"), PackageReference::remote("b")];

        gateway.prefetch(packages.clone());
        // A blocking get waits for the in-flight prefetch instead of
        // starting a second fetch.
        gateway.get(&packages[0]).unwrap();
        gateway.get(&packages[1]).unwrap();
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }
}
