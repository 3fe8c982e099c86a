/// Splits the chip peripherals into named groups, one per task. Taking a
/// peripheral twice is a compile error because `take` moves each field out of
/// `Peripherals` exactly once.
///
/// # Example
/// ```rust
/// assign_resources! {
///     OutputResources {
///         detonate: PIN_20,
///         arm_led: PIN_21,
///     }
/// }
/// ```
#[macro_export]
macro_rules! assign_resources {
    ($( $group_name:ident { $($name:ident: $field:ident),* $(,)? } )*) => {
        $(
            pub struct $group_name {
                $( pub $name: embassy_rp::Peri<'static, embassy_rp::peripherals::$field>, )*
            }
        )*

        #[allow(non_snake_case)]
        pub struct AssignedResources {
            $( pub $group_name: $group_name, )*
        }

        impl AssignedResources {
            pub fn take(p: embassy_rp::Peripherals) -> Self {
                Self {
                    $(
                        $group_name: $group_name {
                            $( $name: p.$field, )*
                        },
                    )*
                }
            }
        }
    };
}
