#![no_std]
#![deny(clippy::large_futures)]

// Export the logging macros for either defmt or log
#[macro_use]
pub mod logging;

pub mod arming;
pub mod checks;
pub mod config;
pub mod errors;
pub mod failsafe;
pub mod filters;
pub mod modes;
pub mod signals;
pub mod sync;
pub mod tasks;
pub mod types;

// Re-exported for implementors
pub use embassy_futures;
pub use embassy_sync;
pub use embassy_time;
pub use heapless;
pub use nalgebra;

#[macro_export]
macro_rules! get_or_warn {
    ($rcv:ident) => {
        async {
            loop {
                use embassy_time::{with_timeout, Duration};
                match with_timeout(Duration::from_secs(1), $rcv.get()).await {
                    Ok(value) => break value,
                    Err(_) => trace!("{}: Awaiting value for <{}>", ID, stringify!($rcv)),
                }
            }
        }
    };
}

#[macro_export]
macro_rules! const_default {
    ($type:ty => { $($token:tt)+ } ) => {
        impl $crate::ConstDefault for $type {
            const DEFAULT: Self = Self::const_default();
        }

        impl $type {
            pub const fn const_default() -> Self {
                Self { $($token)+ }
            }
        }

        impl Default for $type {
            fn default() -> Self {
                Self::const_default()
            }
        }
    };
    ($type:ty => $($token:tt)+ ) => {
        impl $crate::ConstDefault for $type {
            const DEFAULT: Self = Self::const_default();
        }

        impl $type {
            pub const fn const_default() -> Self {
                $($token)+
            }
        }

        impl Default for $type {
            fn default() -> Self {
                Self::const_default()
            }
        }
    };
}

pub trait ConstDefault {
    const DEFAULT: Self;
}
