//! Service container - lifetime-aware registration and resolution.
//!
//! Services are trait objects keyed by their `TypeId`. Every implementation
//! carries its lifetime through [`Component::LIFETIME`]; unmarked
//! implementations are scoped.
//!
//! - Singleton: built once per [`ServiceProvider`]
//! - Scoped: built once per [`ServiceScope`] (one scope per HTTP request)
//! - Transient: built on every resolution

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::errors::{AppError, AppResult};

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    Singleton,
    Scoped,
    Transient,
}

/// Lifetime marker for an implementation type.
pub trait Component: 'static {
    /// `None` registers the implementation as scoped.
    const LIFETIME: Option<ServiceLifetime> = None;

    fn lifetime() -> ServiceLifetime
    where
        Self: Sized,
    {
        Self::LIFETIME.unwrap_or(ServiceLifetime::Scoped)
    }
}

type Instance = Arc<dyn Any + Send + Sync>;
type ErasedFactory = Arc<dyn Fn(&ServiceScope) -> AppResult<Instance> + Send + Sync>;

fn erase<S, F>(factory: F) -> ErasedFactory
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync + 'static,
{
    Arc::new(move |scope| factory(scope).map(|service| Arc::new(service) as Instance))
}

/// One registration: a service, the implementation behind it and its lifetime.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub service: TypeId,
    pub service_name: &'static str,
    pub implementation_name: &'static str,
    pub lifetime: ServiceLifetime,
    factory: ErasedFactory,
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service", &self.service_name)
            .field("implementation", &self.implementation_name)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// An implementation of service `S`, ready to be registered.
pub struct Implementation<S: ?Sized> {
    name: &'static str,
    lifetime: ServiceLifetime,
    factory: Arc<dyn Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync>,
}

impl<S: ?Sized + Send + Sync + 'static> Implementation<S> {
    /// Implementation type `T` built by `factory`, with `T`'s lifetime marker.
    ///
    /// ```ignore
    /// Implementation::<dyn ProductService>::of::<ProductCatalog>(|_| {
    ///     Ok(Arc::new(ProductCatalog::new()) as Arc<dyn ProductService>)
    /// })
    /// ```
    pub fn of<T, F>(factory: F) -> Self
    where
        T: Component,
        F: Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<T>(),
            lifetime: T::lifetime(),
            factory: Arc::new(factory),
        }
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }
}

/// Registration table, turned into a [`ServiceProvider`] at startup.
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Register `factory` for `S` with an explicit lifetime.
    pub fn add<S, F>(&mut self, lifetime: ServiceLifetime, factory: F) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync + 'static,
    {
        self.push::<S>(type_name::<F>(), lifetime, erase(factory))
    }

    pub fn add_singleton<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync + 'static,
    {
        self.add(ServiceLifetime::Singleton, factory)
    }

    pub fn add_scoped<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync + 'static,
    {
        self.add(ServiceLifetime::Scoped, factory)
    }

    pub fn add_transient<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> AppResult<Arc<S>> + Send + Sync + 'static,
    {
        self.add(ServiceLifetime::Transient, factory)
    }

    /// Register an already-built instance as a singleton.
    pub fn add_instance<S>(&mut self, instance: Arc<S>) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.add_singleton(move |_| Ok(instance.clone()))
    }

    /// Register every listed implementation of `S`, each with its own lifetime.
    ///
    /// The same implementation type may be listed under several services; it is
    /// registered once per service.
    pub fn add_services<S>(&mut self, implementations: Vec<Implementation<S>>) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        for implementation in implementations {
            let factory = implementation.factory;
            tracing::debug!(
                service = type_name::<S>(),
                implementation = implementation.name,
                lifetime = ?implementation.lifetime,
                "Registering service"
            );
            self.push::<S>(
                implementation.name,
                implementation.lifetime,
                erase(move |scope: &ServiceScope| factory(scope)),
            );
        }
        self
    }

    fn push<S: ?Sized + 'static>(
        &mut self,
        implementation_name: &'static str,
        lifetime: ServiceLifetime,
        factory: ErasedFactory,
    ) -> &mut Self {
        self.descriptors.push(ServiceDescriptor {
            service: TypeId::of::<S>(),
            service_name: type_name::<S>(),
            implementation_name,
            lifetime,
            factory,
        });
        self
    }

    pub fn build(self) -> ServiceProvider {
        let mut index: HashMap<TypeId, Vec<usize>> = HashMap::new();
        for (position, descriptor) in self.descriptors.iter().enumerate() {
            index.entry(descriptor.service).or_default().push(position);
        }
        let singletons = self.descriptors.iter().map(|_| OnceCell::new()).collect();

        let registry = Arc::new(Registry {
            descriptors: self.descriptors,
            singletons,
            index,
        });
        ServiceProvider {
            root: ServiceScope::new(registry.clone()),
            registry,
        }
    }
}

struct Registry {
    descriptors: Vec<ServiceDescriptor>,
    singletons: Vec<OnceCell<Instance>>,
    index: HashMap<TypeId, Vec<usize>>,
}

/// Built container. Cheap to clone.
#[derive(Clone)]
pub struct ServiceProvider {
    registry: Arc<Registry>,
    root: ServiceScope,
}

impl ServiceProvider {
    /// New scope sharing this provider's singletons.
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope::new(self.registry.clone())
    }

    /// Resolve from the root scope.
    pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> AppResult<Arc<S>> {
        self.root.resolve()
    }

    pub fn resolve_all<S: ?Sized + Send + Sync + 'static>(&self) -> AppResult<Vec<Arc<S>>> {
        self.root.resolve_all()
    }

    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.registry.descriptors
    }
}

/// Resolution context holding scoped instances.
#[derive(Clone)]
pub struct ServiceScope {
    registry: Arc<Registry>,
    instances: Arc<DashMap<usize, Instance>>,
}

impl ServiceScope {
    fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            instances: Arc::new(DashMap::new()),
        }
    }

    /// Resolve `S`; the last registration wins.
    pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> AppResult<Arc<S>> {
        let position = self
            .positions::<S>()
            .last()
            .copied()
            .ok_or(AppError::ServiceNotRegistered(type_name::<S>()))?;
        self.instantiate::<S>(position)
    }

    /// Every registration of `S`, in registration order.
    pub fn resolve_all<S: ?Sized + Send + Sync + 'static>(&self) -> AppResult<Vec<Arc<S>>> {
        self.positions::<S>()
            .iter()
            .map(|&position| self.instantiate::<S>(position))
            .collect()
    }

    fn positions<S: ?Sized + 'static>(&self) -> &[usize] {
        self.registry
            .index
            .get(&TypeId::of::<S>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn instantiate<S: ?Sized + Send + Sync + 'static>(&self, position: usize) -> AppResult<Arc<S>> {
        let descriptor = &self.registry.descriptors[position];

        let instance = match descriptor.lifetime {
            ServiceLifetime::Singleton => self.registry.singletons[position]
                .get_or_try_init(|| (descriptor.factory)(self))
                .cloned()?,
            ServiceLifetime::Scoped => {
                // The guard must be released before the factory runs; factories
                // resolve their own dependencies from this scope.
                let existing = self.instances.get(&position).map(|entry| entry.value().clone());
                match existing {
                    Some(instance) => instance,
                    None => {
                        let built = (descriptor.factory)(self)?;
                        self.instances
                            .entry(position)
                            .or_insert(built)
                            .value()
                            .clone()
                    }
                }
            }
            ServiceLifetime::Transient => (descriptor.factory)(self)?,
        };

        instance
            .downcast_ref::<Arc<S>>()
            .cloned()
            .ok_or_else(|| AppError::internal(format!("type mismatch resolving {}", descriptor.service_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    trait Counter: Send + Sync {
        fn id(&self) -> usize;
    }

    struct English;
    impl Component for English {
        const LIFETIME: Option<ServiceLifetime> = Some(ServiceLifetime::Singleton);
    }
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct French;
    impl Component for French {}
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }
    impl Counter for French {
        fn id(&self) -> usize {
            0
        }
    }

    struct Numbered(usize);
    impl Counter for Numbered {
        fn id(&self) -> usize {
            self.0
        }
    }

    fn counting(collection: &mut ServiceCollection, lifetime: ServiceLifetime) -> Arc<AtomicUsize> {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        collection.add::<dyn Counter, _>(lifetime, move |_| {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Numbered(id)) as Arc<dyn Counter>)
        });
        built
    }

    #[test]
    fn test_marked_and_unmarked_implementations_get_their_lifetimes() {
        let mut services = ServiceCollection::new();
        services.add_services::<dyn Greeter>(vec![
            Implementation::of::<English, _>(|_| Ok(Arc::new(English) as Arc<dyn Greeter>)),
            Implementation::of::<French, _>(|_| Ok(Arc::new(French) as Arc<dyn Greeter>)),
        ]);

        let lifetimes: Vec<_> = services.descriptors().iter().map(|d| d.lifetime).collect();
        assert_eq!(lifetimes, vec![ServiceLifetime::Singleton, ServiceLifetime::Scoped]);
    }

    #[test]
    fn test_implementation_registered_once_per_service() {
        let mut services = ServiceCollection::new();
        services.add_services::<dyn Greeter>(vec![Implementation::of::<French, _>(|_| {
            Ok(Arc::new(French) as Arc<dyn Greeter>)
        })]);
        services.add_services::<dyn Counter>(vec![Implementation::of::<French, _>(|_| {
            Ok(Arc::new(French) as Arc<dyn Counter>)
        })]);

        assert_eq!(services.len(), 2);
        let provider = services.build();
        assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
        assert_eq!(provider.resolve::<dyn Counter>().unwrap().id(), 0);
    }

    #[test]
    fn test_last_registration_wins_and_resolve_all_keeps_order() {
        let mut services = ServiceCollection::new();
        services.add_services::<dyn Greeter>(vec![
            Implementation::of::<English, _>(|_| Ok(Arc::new(English) as Arc<dyn Greeter>)),
            Implementation::of::<French, _>(|_| Ok(Arc::new(French) as Arc<dyn Greeter>)),
        ]);
        let provider = services.build();

        assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
        let all: Vec<_> = provider
            .resolve_all::<dyn Greeter>()
            .unwrap()
            .iter()
            .map(|g| g.greet())
            .collect();
        assert_eq!(all, vec!["hello", "bonjour"]);
    }

    #[test]
    fn test_singleton_shared_across_scopes() {
        let mut services = ServiceCollection::new();
        let built = counting(&mut services, ServiceLifetime::Singleton);
        let provider = services.build();

        let a = provider.create_scope().resolve::<dyn Counter>().unwrap();
        let b = provider.create_scope().resolve::<dyn Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_once_per_scope() {
        let mut services = ServiceCollection::new();
        let built = counting(&mut services, ServiceLifetime::Scoped);
        let provider = services.build();

        let scope = provider.create_scope();
        let a = scope.resolve::<dyn Counter>().unwrap();
        let b = scope.resolve::<dyn Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = provider.create_scope().resolve::<dyn Counter>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_never_shared() {
        let mut services = ServiceCollection::new();
        let built = counting(&mut services, ServiceLifetime::Transient);
        let provider = services.build();

        let scope = provider.create_scope();
        let a = scope.resolve::<dyn Counter>().unwrap();
        let b = scope.resolve::<dyn Counter>().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factories_resolve_dependencies_from_scope() {
        struct Loud(Arc<dyn Greeter>);
        impl Counter for Loud {
            fn id(&self) -> usize {
                self.0.greet().len()
            }
        }

        let mut services = ServiceCollection::new();
        services.add_instance::<dyn Greeter>(Arc::new(English));
        services.add_scoped::<dyn Counter, _>(|scope| {
            Ok(Arc::new(Loud(scope.resolve::<dyn Greeter>()?)) as Arc<dyn Counter>)
        });
        let provider = services.build();

        assert_eq!(provider.create_scope().resolve::<dyn Counter>().unwrap().id(), 5);
    }

    #[test]
    fn test_unregistered_service_is_an_error() {
        let provider = ServiceCollection::new().build();
        let result = provider.resolve::<dyn Greeter>();
        assert!(matches!(result, Err(AppError::ServiceNotRegistered(_))));
        assert!(provider.resolve_all::<dyn Greeter>().unwrap().is_empty());
    }

    #[test]
    fn test_failed_singleton_construction_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn Counter, _>(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::internal("not yet"))
            } else {
                Ok(Arc::new(Numbered(9)) as Arc<dyn Counter>)
            }
        });
        let provider = services.build();

        assert!(provider.resolve::<dyn Counter>().is_err());
        assert_eq!(provider.resolve::<dyn Counter>().unwrap().id(), 9);
    }
}
