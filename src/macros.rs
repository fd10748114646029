/// Construct a [`Value`][crate::Value] using a literal syntax.
///
/// Braces build a [`TemplateStruct`][crate::TemplateStruct] with identifier
/// keys, brackets build a [`TemplateList`][crate::TemplateList], `None`
/// becomes the none value and anything else is converted with
/// [`From`].
///
/// ```
/// use quill::value;
///
/// let user = value! {
///     name: "John Smith",
///     roles: ["admin", "dev"],
///     manager: None,
/// };
/// assert_eq!(user.to_string(), "{manager: , name: John Smith, roles: [admin, dev]}");
/// ```
#[macro_export]
macro_rules! value {
    ($($v:tt)+) => {
        $crate::_value!($($v)+)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! _value {
    //////////////////////////////////////////////////////////////////////////
    // TT muncher for the inside of a list [...]. Each element is appended to
    // the given list variable.
    //
    // Must be invoked as: _value!(@list $list $($tt)*)
    //////////////////////////////////////////////////////////////////////////

    // Done.
    (@list $list:ident) => {};

    // Next element is `None`.
    (@list $list:ident None $(, $($rest:tt)*)?) => {
        $list.append($crate::_value!(None));
        $($crate::_value!(@list $list $($rest)*);)?
    };

    // Next element is a list.
    (@list $list:ident [$($inner:tt)*] $(, $($rest:tt)*)?) => {
        $list.append($crate::_value!([$($inner)*]));
        $($crate::_value!(@list $list $($rest)*);)?
    };

    // Next element is a struct.
    (@list $list:ident {$($inner:tt)*} $(, $($rest:tt)*)?) => {
        $list.append($crate::_value!({$($inner)*}));
        $($crate::_value!(@list $list $($rest)*);)?
    };

    // Next element is an expression followed by a comma.
    (@list $list:ident $next:expr, $($rest:tt)*) => {
        $list.append($crate::_value!($next));
        $crate::_value!(@list $list $($rest)*);
    };

    // Last element is an expression with no trailing comma.
    (@list $list:ident $last:expr) => {
        $list.append($crate::_value!($last));
    };

    //////////////////////////////////////////////////////////////////////////
    // TT muncher for the inside of a struct {...}. Each field is set on the
    // given struct variable.
    //
    // Must be invoked as: _value!(@struct $s $($tt)*)
    //////////////////////////////////////////////////////////////////////////

    // Done.
    (@struct $s:ident) => {};

    // Next value is `None`.
    (@struct $s:ident $key:ident : None $(, $($rest:tt)*)?) => {
        $s.set(stringify!($key), $crate::_value!(None));
        $($crate::_value!(@struct $s $($rest)*);)?
    };

    // Next value is a list.
    (@struct $s:ident $key:ident : [$($inner:tt)*] $(, $($rest:tt)*)?) => {
        $s.set(stringify!($key), $crate::_value!([$($inner)*]));
        $($crate::_value!(@struct $s $($rest)*);)?
    };

    // Next value is a struct.
    (@struct $s:ident $key:ident : {$($inner:tt)*} $(, $($rest:tt)*)?) => {
        $s.set(stringify!($key), $crate::_value!({$($inner)*}));
        $($crate::_value!(@struct $s $($rest)*);)?
    };

    // Next value is an expression followed by a comma.
    (@struct $s:ident $key:ident : $value:expr, $($rest:tt)*) => {
        $s.set(stringify!($key), $crate::_value!($value));
        $crate::_value!(@struct $s $($rest)*);
    };

    // Last value is an expression with no trailing comma.
    (@struct $s:ident $key:ident : $value:expr) => {
        $s.set(stringify!($key), $crate::_value!($value));
    };

    //////////////////////////////////////////////////////////////////////////
    // The main implementation.
    //
    // Must be invoked as: _value!($($tokens)+)
    //////////////////////////////////////////////////////////////////////////

    (None) => {
        $crate::Value::default()
    };

    ([]) => {
        $crate::Value::from($crate::TemplateList::alloc())
    };

    ([ $($tt:tt)+ ]) => {{
        let list = $crate::TemplateList::alloc();
        $crate::_value!(@list list $($tt)+);
        $crate::Value::from(list)
    }};

    ({}) => {
        $crate::Value::from($crate::TemplateStruct::alloc())
    };

    ({ $($tt:tt)+ }) => {{
        let s = $crate::TemplateStruct::alloc();
        $crate::_value!(@struct s $($tt)+);
        $crate::Value::from(s)
    }};

    // A bare list of fields without the surrounding braces.
    ($key:ident : $($tt:tt)+) => {
        $crate::_value!({ $key : $($tt)+ })
    };

    ($other:expr) => {
        $crate::Value::from($other)
    };
}

#[cfg(test)]
mod tests {
    use crate::Value;

    #[test]
    fn value_macro_scalars() {
        assert!(value!(None).is_none());
        assert_eq!(value!(true).to_string(), "true");
        assert_eq!(value!(-7).to_string(), "-7");
        assert_eq!(value!("lorem").to_string(), "lorem");
    }

    #[test]
    fn value_macro_nested() {
        let v: Value = value! {
            ipsum: { dolor: [1, None, "sit"] },
            amet: [],
            empty: {},
        };
        assert_eq!(v.to_string(), "{amet: [], empty: {}, ipsum: {dolor: [1, , sit]}}");
    }

    #[test]
    fn value_macro_list_of_structs() {
        let v = value!([{ a: 1 }, { a: 2 }]);
        let list = v.as_list().unwrap();
        assert_eq!(list.count(), 2);
        assert_eq!(list.at(1).to_string(), "{a: 2}");
    }
}
