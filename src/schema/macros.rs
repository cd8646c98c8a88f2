/// Stores a string-like enum as a Postgres `TEXT` value through
/// its [`FromStr`](std::str::FromStr) and `as_str` implementations.
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> <sqlx::Postgres as sqlx::Database>::TypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &<sqlx::Postgres as sqlx::Database>::TypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut <sqlx::Postgres as sqlx::database::HasArguments<'q>>::ArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(&*self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: <sqlx::Postgres as sqlx::database::HasValueRef<'r>>::ValueRef,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let value = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(value.parse::<$ty>()?)
            }
        }
    };
}

pub(crate) use text_column;
