//! Global functions and abstractions.
//!
//! This module holds the fixed set of global functions that directives may
//! call.  The set is deliberately closed: templates cannot reach anything
//! that was not registered on the [`Environment`](crate::Environment), and
//! the implicit `print` output helper is handled by the VM itself.
//!
//! ## Custom Functions
//!
//! A custom function is a simple function which accepts its inputs as
//! parameters and returns a new value:
//!
//! ```
//! # use stencil::{Environment, Error};
//! # let mut env = Environment::new();
//! fn shout(env: &Environment, value: String) -> Result<String, Error> {
//!     Ok(value.to_uppercase())
//! }
//!
//! env.add_function("shout", shout);
//! ```
//!
//! The necessary conversions are performed automatically through the
//! [`FunctionArgs`](crate::value::FunctionArgs) and [`Into`] traits.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::Error;
use crate::value::{FunctionArgs, Value};

type FuncFunc =
    dyn Fn(&Environment, Vec<Value>) -> Result<Value, Error> + Sync + Send + 'static;

pub(crate) struct BoxedFunction(Arc<FuncFunc>);

/// A utility trait that represents global functions.
pub trait Function<Rv = Value, Args = Vec<Value>>: Send + Sync + 'static {
    /// Invokes the function with the given arguments.
    fn invoke(&self, env: &Environment, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Function<Rv, ($($name,)*)> for Func
        where
            Func: Fn(&Environment, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn invoke(&self, env: &Environment, args: ($($name,)*)) -> Result<Rv, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(env, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

impl BoxedFunction {
    /// Creates a new boxed function.
    pub fn new<F, Rv, Args>(f: F) -> BoxedFunction
    where
        F: Function<Rv, Args>,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFunction(Arc::new(move |env, args| -> Result<Value, Error> {
            f.invoke(env, FunctionArgs::from_values(args)?).map(Into::into)
        }))
    }

    /// Invokes the function.
    pub fn invoke(&self, env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
        (self.0)(env, args)
    }
}

pub(crate) fn get_builtin_functions() -> BTreeMap<&'static str, BoxedFunction> {
    #[allow(unused_mut)]
    let mut rv = BTreeMap::new();
    #[cfg(feature = "builtins")]
    {
        rv.insert("range", BoxedFunction::new(range));
        rv.insert("length", BoxedFunction::new(length));
        #[cfg(feature = "json")]
        rv.insert("json", BoxedFunction::new(json));
    }
    rv
}

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;

    use crate::error::ErrorKind;

    /// Returns a list of numbers.
    ///
    /// With one argument counts from zero to just below it, with two it
    /// counts from the first to just below the second.
    pub fn range(_env: &Environment, lower: u32, upper: Option<u32>) -> Result<Vec<Value>, Error> {
        let rv: Vec<Value> = match upper {
            Some(upper) => (lower..upper).map(Value::from).collect(),
            None => (0..lower).map(Value::from).collect(),
        };
        Ok(rv)
    }

    /// Returns the "length" of the value.
    pub fn length(_env: &Environment, v: Value) -> Result<Value, Error> {
        v.len().map(Value::from).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                "cannot calculate length of this value",
            )
        })
    }

    /// Serializes a value to its JSON representation.
    #[cfg(feature = "json")]
    pub fn json(_env: &Environment, v: Value) -> Result<String, Error> {
        serde_json::to_string(&v)
            .map_err(|err| Error::new(ErrorKind::BadSerialization, err.to_string()))
    }

    #[test]
    fn test_basics() {
        fn test(_: &Environment, a: u32, b: u32) -> Result<u32, Error> {
            Ok(a + b)
        }

        let env = Environment::new();
        let bx = BoxedFunction::new(test);
        assert_eq!(
            bx.invoke(&env, vec![Value::from(23), Value::from(42)])
                .unwrap(),
            Value::from(65)
        );
    }

    #[test]
    fn test_optional_args() {
        let env = Environment::new();
        let bx = BoxedFunction::new(range);
        assert_eq!(
            bx.invoke(&env, vec![Value::from(3)]).unwrap(),
            Value::from(vec![Value::from(0), Value::from(1), Value::from(2)])
        );
        assert_eq!(
            bx.invoke(&env, vec![Value::from(1), Value::from(3)])
                .unwrap(),
            Value::from(vec![Value::from(1), Value::from(2)])
        );
    }
}

#[cfg(feature = "builtins")]
pub use self::builtins::*;
