use super::EapMethod;
use super::extension::PeapExtensionMethod;
use super::identity::IdentityMethod;
use super::md5::Md5Method;
use super::nak::NakMethod;
use super::peap::PeapMethod;
use super::tls::TlsMethod;
use crate::negotiate::Negotiator;
use eap_proto::EapType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type MethodFactory = Arc<dyn Fn(&Negotiator) -> Box<dyn EapMethod> + Send + Sync>;

/// Maps a method type to the factory that builds a fresh instance of it
#[derive(Clone, Default)]
pub struct MethodRegistry {
    factories: HashMap<EapType, MethodFactory>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every method this crate implements
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EapType::Identity, |n| Box::new(IdentityMethod::new(n)));
        registry.register(EapType::Nak, |_| Box::new(NakMethod::default()));
        registry.register(EapType::Md5Challenge, |n| Box::new(Md5Method::new(n)));
        registry.register(EapType::Tls, |n| Box::new(TlsMethod::new(n)));
        registry.register(EapType::Peap, |n| Box::new(PeapMethod::new(n)));
        registry.register(EapType::PeapExtension, |_| {
            Box::new(PeapExtensionMethod::default())
        });
        registry
    }

    /// Add or replace the factory for `method`
    pub fn register<F>(&mut self, method: EapType, factory: F)
    where
        F: Fn(&Negotiator) -> Box<dyn EapMethod> + Send + Sync + 'static,
    {
        self.factories.insert(method, Arc::new(factory));
    }

    pub fn create(&self, method: EapType, negotiator: &Negotiator) -> Option<Box<dyn EapMethod>> {
        self.factories.get(&method).map(|factory| factory(negotiator))
    }

    pub fn contains(&self, method: EapType) -> bool {
        self.factories.contains_key(&method)
    }

    /// Registered types, in ascending order
    pub fn types(&self) -> Vec<EapType> {
        let mut types: Vec<EapType> = self.factories.keys().copied().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("types", &self.types())
            .finish()
    }
}
