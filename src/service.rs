//! The HelloWorld service contract and its default implementation.

use tracing::instrument;

/// Name substituted when a request carries no name at all.
pub const DEFAULT_NAME: &str = "World";

/// Operation name of the single `Hello` operation.
pub const HELLO_OPERATION: &str = "Hello";

/// Static description of a service contract: its name and operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contract {
    pub name: &'static str,
    pub operations: &'static [&'static str],
}

impl Contract {
    /// Whether this contract exposes the given operation.
    pub fn handles(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| *op == operation)
    }
}

/// The HelloWorld contract.
pub const HELLO_WORLD: Contract = Contract {
    name: "HelloWorld",
    operations: &[HELLO_OPERATION],
};

/// Service implementing the HelloWorld contract.
///
/// Implementations are shared by every connection and must be reentrant.
pub trait HelloWorld: Send + Sync {
    /// Build a greeting for `name`.
    ///
    /// `None` means the client sent no name; an empty string is a valid name.
    fn hello(&self, name: Option<&str>) -> String;
}

/// Default greeter: `Hello, <name>!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Greeter;

impl HelloWorld for Greeter {
    #[instrument(level = "trace", skip(self), ret)]
    fn hello(&self, name: Option<&str>) -> String {
        format!("Hello, {}!", name.unwrap_or(DEFAULT_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_contains_name() {
        let greeter = Greeter;
        for name in ["alice", "Bob Smith", "héllo wörld", "  padded  "] {
            let greeting = greeter.hello(Some(name));
            assert!(greeting.contains(name), "{greeting:?} missing {name:?}");
        }
    }

    #[test]
    fn test_hello_is_deterministic() {
        let greeter = Greeter;
        assert_eq!(greeter.hello(Some("alice")), greeter.hello(Some("alice")));
        assert_eq!(greeter.hello(Some("alice")), "Hello, alice!");
    }

    #[test]
    fn test_hello_empty_name() {
        assert_eq!(Greeter.hello(Some("")), "Hello, !");
    }

    #[test]
    fn test_hello_without_name_uses_default() {
        assert_eq!(Greeter.hello(None), "Hello, World!");
        assert_eq!(Greeter.hello(None), Greeter.hello(None));
    }

    #[test]
    fn test_contract_handles() {
        assert!(HELLO_WORLD.handles("Hello"));
        assert!(!HELLO_WORLD.handles("hello"));
        assert!(!HELLO_WORLD.handles("Goodbye"));
    }
}
