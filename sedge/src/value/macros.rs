/// Constructs [`Value`]s using JSON-like syntax.
///
/// # Example
///
/// ```rust
/// # use sedge::{graphql_value, Value};
/// # let _: Value =
/// graphql_value!(null);
/// # let _: Value =
/// graphql_value!(1234);
/// # let _: Value =
/// graphql_value!("test");
/// # let _: Value =
/// graphql_value!([1234, "test", true]);
/// # let _: Value =
/// graphql_value!({"key": "value", "foo": 1234});
/// ```
///
/// [`Value`]: crate::Value
#[macro_export]
macro_rules! graphql_value {
    (null) => {
        $crate::Value::Null
    };
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::List(vec![ $( $crate::graphql_value!($elem) ),* ])
    };
    ({ $($key:tt : $val:tt),* $(,)? }) => {{
        let fields: ::std::vec::Vec<(::std::string::String, $crate::Value)> = vec![
            $( (::std::string::String::from($key), $crate::graphql_value!($val)) ),*
        ];
        $crate::Value::Object(fields.into_iter().collect::<$crate::Object>())
    }};
    ($e:expr) => {
        $crate::Value::from($e)
    };
}

/// Constructs [`InputValue`]s using JSON-like syntax.
///
/// Variable references are not expressible here; construct them with
/// [`InputValue::variable`] instead.
///
/// [`InputValue`]: crate::InputValue
/// [`InputValue::variable`]: crate::InputValue::variable
#[macro_export]
macro_rules! graphql_input_value {
    (null) => {
        $crate::InputValue::Null
    };
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::InputValue::list(vec![ $( $crate::graphql_input_value!($elem) ),* ])
    };
    ({ $($key:tt : $val:tt),* $(,)? }) => {{
        let fields: ::std::vec::Vec<(&str, $crate::InputValue)> = vec![
            $( ($key, $crate::graphql_input_value!($val)) ),*
        ];
        $crate::InputValue::object(fields)
    }};
    ($e:expr) => {
        $crate::InputValue::scalar($e)
    };
}

/// Constructs a [`Variables`] map using JSON-like syntax.
///
/// # Example
///
/// ```rust
/// # use sedge::{graphql_vars, Variables};
/// let vars: Variables = graphql_vars! {"skip": true, "first": 10};
/// ```
///
/// [`Variables`]: crate::Variables
#[macro_export]
macro_rules! graphql_vars {
    () => {
        $crate::Variables::new()
    };
    ( $($key:tt : $val:tt),* $(,)? ) => {
        $crate::Variables::from([
            $( (String::from($key), $crate::graphql_input_value!($val)) ),*
        ])
    };
}
