/// Integer conversion that fails with [crate::error::Error::TryFromInt]
/// instead of truncating. `snafu::ResultExt` must be in scope.
#[macro_export]
macro_rules! convert_num {
    ($num: expr, $ty: ty) => {{
        let num = $num;
        TryInto::<$ty>::try_into(num).context($crate::error::TryFromIntSnafu {
            value: num.to_string(),
            from: std::any::type_name_of_val(&num),
            to: stringify!($ty),
        })
    }};
}
