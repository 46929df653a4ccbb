// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for spelling a [`ValueType`](crate::types::ValueType).
///
/// - `any`, `boolean`, `number`, `string`: simple kinds
/// - `{}`: a complex instance of any type, `{"id"}`: of the type `id`
/// - `[element]`: a list of `element`
///
/// ```rust
/// # use typetx::{value_type, types::{SimpleKind, ValueType}};
/// assert_eq!(value_type!([string]), ValueType::list(ValueType::Simple(SimpleKind::String)));
/// assert_eq!(value_type!({"person"}), ValueType::complex("person"));
/// ```
#[macro_export]
macro_rules! value_type {
    (any) => {
        $crate::types::ValueType::Simple($crate::types::SimpleKind::Any)
    };
    (boolean) => {
        $crate::types::ValueType::Simple($crate::types::SimpleKind::Boolean)
    };
    (number) => {
        $crate::types::ValueType::Simple($crate::types::SimpleKind::Number)
    };
    (string) => {
        $crate::types::ValueType::Simple($crate::types::SimpleKind::String)
    };
    ({}) => {
        $crate::types::ValueType::Complex(None)
    };
    ({ $id:literal }) => {
        $crate::types::ValueType::complex($id)
    };
    ([ $($element:tt)+ ]) => {
        $crate::types::ValueType::list($crate::value_type!($($element)+))
    };
}

/// Convenience macro for building a [`ComplexType`](crate::types::ComplexType).
///
/// Every property is `name => type`, with the type spelled as for
/// [`value_type`](crate::value_type), optionally followed by flags in parentheses
/// (`boundary`, `required`, `read_only`). Evaluates to the result of
/// [`ComplexTypeBuilder::build`](crate::types::ComplexTypeBuilder::build).
///
/// ```rust
/// # use typetx::complex_type;
/// let person = complex_type!("person" {
///     "name" => string (required),
///     "friends" => [{"person"}],
///     "watched" => [{}] (boundary),
/// })
/// .unwrap();
/// assert!(person.property("watched").unwrap().is_boundary());
/// ```
#[macro_export]
macro_rules! complex_type {
    ($id:literal { $( $name:literal => $ty:tt $( ( $($flag:ident),* ) )? ),* $(,)? }) => {
        $crate::types::ComplexType::builder($id)
            $(
                .property(
                    $crate::types::PropertyType::new($name, $crate::value_type!($ty))
                        $( $( .$flag() )* )?
                )
            )*
            .build()
    };
}

/// Convenience macro for a `Vec` of [`Value`](crate::Value)s.
///
/// ```rust
/// # use typetx::{values, Value};
/// assert_eq!(values!["a", 1, true], vec![Value::from("a"), Value::from(1), Value::from(true)]);
/// ```
#[macro_export]
macro_rules! values {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::Value::from($value)),*]
    };
}
