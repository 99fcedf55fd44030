//! Process-wide panic reporting through `tracing`.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::thread;

/// Route panics into the log before the default hook prints them.
///
/// Worker threads catch their own panics, so this mostly serves as a record
/// of where they happened.
pub fn install() {
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let current = thread::current();
        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown>".into());

        tracing::error!(
            target: "raster_batch::panic",
            thread = current.name().unwrap_or("<unnamed>"),
            location = %location,
            backtrace = %Backtrace::capture(),
            "panic: {}",
            payload_message(info.payload())
        );

        previous(info);
    }));
}

/// Best-effort text of a panic payload.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string())
}
