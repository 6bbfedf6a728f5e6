// Copyright 2025 Cowboy AI, LLC.

//! Static descriptors of operation types
//!
//! Every operation type is described once: its registration key, declared
//! isolation, expressed output and the nested operations it `uses`. The
//! description is computed on first access, cached for the life of the
//! process and never changed afterwards.
//!
//! ```mermaid
//! graph TD
//!     A[Operation::describe] -->|first access| B[DescriptorBuilder]
//!     B -->|uses::<T>| C[descriptor_of::<T>]
//!     C --> B
//!     B -->|build| D[&'static OperationDescriptor]
//! ```

use crate::error_collection::IgnoreRule;
use crate::errors::{RoutineError, RoutineResult};
use crate::isolation::IsolationLevel;
use crate::operation::{Operation, OperationType};
use crate::term::Term;
use crate::term_mapper::TermMapper;
use indexmap::IndexMap;
use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Static description of an operation type
#[derive(Debug)]
pub struct OperationDescriptor {
    key: String,
    type_name: &'static str,
    declared_isolation: IsolationLevel,
    isolation: IsolationLevel,
    express_output: Option<Term>,
    registrations: IndexMap<String, Registration>,
}

impl OperationDescriptor {
    /// Start describing `T`, keyed by its snake_cased type name
    pub fn builder<T: Operation>() -> DescriptorBuilder {
        let type_name = type_name::<T>();
        DescriptorBuilder {
            key: derive_key(type_name),
            type_name,
            isolation: IsolationLevel::default(),
            express_output: None,
            registrations: IndexMap::new(),
            error: None,
        }
    }

    /// Registration key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rust type name of the operation
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Isolation the type asked for itself
    pub fn declared_isolation(&self) -> IsolationLevel {
        self.declared_isolation
    }

    /// Isolation widened over every used operation
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Output returned by [`crate::Engine::express`]
    pub fn express_output(&self) -> Option<&Term> {
        self.express_output.as_ref()
    }

    /// Registration under `key`
    pub fn registration(&self, key: &str) -> Option<&Registration> {
        self.registrations.get(key)
    }

    /// First registration of the operation type `type_id`
    pub fn registration_for(&self, type_id: TypeId) -> Option<&Registration> {
        self.registrations
            .values()
            .find(|registration| registration.operation.type_id() == type_id)
    }

    /// All registrations in declaration order
    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.values()
    }
}

/// A nested operation declared with `uses`
#[derive(Debug)]
pub struct Registration {
    key: String,
    operation: OperationType,
    descriptor: &'static OperationDescriptor,
    input_mapper: TermMapper,
    output_mapper: TermMapper,
    ignored_errors: Vec<IgnoreRule>,
}

impl Registration {
    /// Key the caller runs it under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Descriptor of the used operation
    pub fn descriptor(&self) -> &'static OperationDescriptor {
        self.descriptor
    }

    /// The used operation type
    pub fn operation(&self) -> OperationType {
        self.operation
    }

    /// Translates offending inputs of transferred errors
    pub fn input_mapper(&self) -> &TermMapper {
        &self.input_mapper
    }

    /// Translates output names
    pub fn output_mapper(&self) -> &TermMapper {
        &self.output_mapper
    }

    /// Errors dropped instead of transferred
    pub fn ignored_errors(&self) -> &[IgnoreRule] {
        &self.ignored_errors
    }
}

/// Options for one `uses` declaration
#[derive(Debug, Clone, Default)]
pub struct Uses {
    alias: Option<String>,
    inputs: Option<TermMapper>,
    outputs: Option<TermMapper>,
    ignored_errors: Vec<IgnoreRule>,
}

impl Uses {
    /// Defaults: keyed by the used type's key, scoped by that key both ways
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `key` instead of the used type's key
    pub fn alias(mut self, key: impl Into<String>) -> Self {
        self.alias = Some(key.into());
        self
    }

    /// Translate offending inputs with `mapper` instead of the default scope
    pub fn inputs(mut self, mapper: TermMapper) -> Self {
        self.inputs = Some(mapper);
        self
    }

    /// Translate output names with `mapper` instead of the default scope
    pub fn outputs(mut self, mapper: TermMapper) -> Self {
        self.outputs = Some(mapper);
        self
    }

    /// Drop matching errors of the used operation instead of transferring them
    pub fn ignore_error(mut self, rule: impl Into<IgnoreRule>) -> Self {
        self.ignored_errors.push(rule.into());
        self
    }
}

/// Builder returned by [`OperationDescriptor::builder`]
#[derive(Debug)]
pub struct DescriptorBuilder {
    key: String,
    type_name: &'static str,
    isolation: IsolationLevel,
    express_output: Option<Term>,
    registrations: IndexMap<String, Registration>,
    error: Option<RoutineError>,
}

impl DescriptorBuilder {
    /// Override the registration key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Declare the isolation this type needs on its own
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Name the output this type expresses as its value
    pub fn express_output(mut self, name: impl Into<Term>) -> Self {
        self.express_output = Some(name.into());
        self
    }

    /// Declare `T` as a nested operation with default options
    pub fn uses<T: Operation + Default>(self) -> Self {
        self.uses_with::<T>(Uses::new())
    }

    /// Declare `T` as a nested operation
    pub fn uses_with<T: Operation + Default>(mut self, uses: Uses) -> Self {
        if self.error.is_some() {
            return self;
        }
        let descriptor = match descriptor_of::<T>() {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.error = Some(err);
                return self;
            }
        };
        let key = uses.alias.unwrap_or_else(|| descriptor.key().to_string());
        if self.registrations.contains_key(&key) {
            self.error = Some(RoutineError::invalid_argument(format!(
                "`{}` already uses an operation under the key `{key}`",
                self.key
            )));
            return self;
        }
        let scope = Term::new(key.as_str());
        let registration = Registration {
            key: key.clone(),
            operation: OperationType::of::<T>(),
            descriptor,
            input_mapper: uses
                .inputs
                .unwrap_or_else(|| TermMapper::scoped(scope.clone())),
            output_mapper: uses.outputs.unwrap_or_else(|| TermMapper::scoped(scope)),
            ignored_errors: uses.ignored_errors,
        };
        self.registrations.insert(key, registration);
        self
    }

    /// Finish the description
    pub fn build(self) -> RoutineResult<OperationDescriptor> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let isolation = self
            .registrations
            .values()
            .fold(self.isolation, |level, registration| {
                level.widen(registration.descriptor.isolation())
            });
        Ok(OperationDescriptor {
            key: self.key,
            type_name: self.type_name,
            declared_isolation: self.isolation,
            isolation,
            express_output: self.express_output,
            registrations: self.registrations,
        })
    }
}

type Catalog = RwLock<HashMap<TypeId, &'static OperationDescriptor>>;

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(Default::default)
}

thread_local! {
    static DESCRIBING: RefCell<Vec<TypeId>> = RefCell::new(Vec::new());
}

struct DescribeGuard(TypeId);

impl DescribeGuard {
    fn enter(type_id: TypeId, type_name: &str) -> RoutineResult<Self> {
        DESCRIBING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&type_id) {
                return Err(RoutineError::invalid_argument(format!(
                    "`{type_name}` uses itself through its nested operations"
                )));
            }
            stack.push(type_id);
            Ok(DescribeGuard(type_id))
        })
    }
}

impl Drop for DescribeGuard {
    fn drop(&mut self) {
        DESCRIBING.with(|stack| stack.borrow_mut().retain(|id| *id != self.0));
    }
}

/// The cached descriptor of `T`, describing it on first access
pub fn descriptor_of<T: Operation>() -> RoutineResult<&'static OperationDescriptor> {
    let type_id = TypeId::of::<T>();
    let cached = catalog()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
        .copied();
    if let Some(descriptor) = cached {
        return Ok(descriptor);
    }

    let described = {
        let _guard = DescribeGuard::enter(type_id, type_name::<T>())?;
        T::describe()?
    };

    let mut catalog = catalog().write().unwrap_or_else(PoisonError::into_inner);
    let descriptor: &'static OperationDescriptor = *catalog
        .entry(type_id)
        .or_insert_with(|| Box::leak(Box::new(described)));
    debug!(
        key = %descriptor.key(),
        isolation = %descriptor.isolation(),
        uses = descriptor.registrations.len(),
        "Cached operation descriptor"
    );
    Ok(descriptor)
}

/// Registration key derived from a Rust type name
///
/// Module path and generic arguments are dropped and the rest snake_cased:
/// `app::signup::RegisterUser` becomes `register_user`.
pub fn derive_key(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let name = base.rsplit("::").next().unwrap_or(base);
    let chars: Vec<char> = name.chars().collect();
    let mut key = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary {
                key.push('_');
            }
            key.extend(ch.to_lowercase());
        } else {
            key.push(ch);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Flow;
    use crate::invocation::Invocation;
    use crate::operation::Args;
    use test_case::test_case;

    #[derive(Default)]
    struct ValidateEmail;

    impl Operation for ValidateEmail {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .isolation(IsolationLevel::ReadCommitted)
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ChargeCard;

    impl Operation for ChargeCard {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .isolation(IsolationLevel::Serializable)
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Checkout;

    impl Operation for Checkout {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .isolation(IsolationLevel::ReadCommitted)
                .express_output("order_id")
                .uses::<ValidateEmail>()
                .uses_with::<ChargeCard>(
                    Uses::new()
                        .alias("payment")
                        .inputs(TermMapper::mapped([("card", "credit_card")]))
                        .ignore_error("declined"),
                )
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    #[derive(Default)]
    struct UsesTwice;

    impl Operation for UsesTwice {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .uses::<ValidateEmail>()
                .uses::<ValidateEmail>()
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recursive;

    impl Operation for Recursive {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .uses::<Recursive>()
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    #[test_case("app::signup::RegisterUser", "register_user")]
    #[test_case("RegisterUser", "register_user")]
    #[test_case("app::HTTPRequest", "http_request")]
    #[test_case("app::Wrapper<app::Inner>", "wrapper")]
    #[test_case("app::Step2Confirm", "step2_confirm")]
    #[test_case("already_snake", "already_snake")]
    fn test_derive_key(type_name: &str, expected: &str) {
        assert_eq!(derive_key(type_name), expected);
    }

    #[test]
    fn test_uses_widens_isolation() {
        let checkout = descriptor_of::<Checkout>().unwrap();
        assert_eq!(checkout.key(), "checkout");
        assert_eq!(checkout.declared_isolation(), IsolationLevel::ReadCommitted);
        assert_eq!(checkout.isolation(), IsolationLevel::Serializable);
        assert_eq!(checkout.express_output(), Some(&Term::new("order_id")));
    }

    #[test]
    fn test_registration_table() {
        let checkout = descriptor_of::<Checkout>().unwrap();
        let keys: Vec<&str> = checkout.registrations().map(Registration::key).collect();
        assert_eq!(keys, vec!["validate_email", "payment"]);

        let validate = checkout.registration("validate_email").unwrap();
        assert_eq!(
            validate.input_mapper(),
            &TermMapper::scoped("validate_email")
        );
        assert_eq!(
            validate.output_mapper(),
            &TermMapper::scoped("validate_email")
        );

        let payment = checkout.registration("payment").unwrap();
        assert_eq!(payment.descriptor().key(), "charge_card");
        assert_eq!(
            payment.input_mapper(),
            &TermMapper::mapped([("card", "credit_card")])
        );
        assert_eq!(payment.output_mapper(), &TermMapper::scoped("payment"));
        assert_eq!(payment.ignored_errors().len(), 1);

        let by_type = checkout.registration_for(TypeId::of::<ChargeCard>()).unwrap();
        assert_eq!(by_type.key(), "payment");
        assert!(checkout.registration("charge_card").is_none());
    }

    #[test]
    fn test_descriptor_is_cached() {
        let first = descriptor_of::<Checkout>().unwrap();
        let second = descriptor_of::<Checkout>().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let err = descriptor_of::<UsesTwice>().unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("validate_email"));
    }

    #[test]
    fn test_self_use_is_rejected() {
        let err = descriptor_of::<Recursive>().unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
