#[cfg(feature = "log")]
#[macro_use]
mod log {
    macro_rules! pbuf_log {
        (trace, $($arg:expr),*) => { ::log::trace!($($arg),*); };
        (debug, $($arg:expr),*) => { ::log::debug!($($arg),*); };
    }
}

#[cfg(not(feature = "log"))]
#[macro_use]
mod log {
    macro_rules! pbuf_log {
        ($level:ident, $($arg:expr),*) => { $( let _ = $arg; )* }
    }
}

macro_rules! pbuf_trace {
    ($($arg:expr),*) => (pbuf_log!(trace, $($arg),*));
}

macro_rules! pbuf_debug {
    ($($arg:expr),*) => (pbuf_log!(debug, $($arg),*));
}
