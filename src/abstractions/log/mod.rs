/*!

# Overview

The `log` module provides logging with per-category gates for grounder diagnostics. A *category* classifies a
diagnostic (operation undefined, atom undefined, unbounded variable, …); every warning the grounder emits carries one.
Categories can be enabled and disabled globally, which is how the `--warn` style configuration switches are
implemented. Messages without a category (engine tracing, debug output) are always passed through to the subscriber.

Here is a simple example.

```
use stratum::log::*;

fn main() {
    // Disable the `atom-undefined` category. Messages logged with that
    // category will not be emitted.
    enable_category(categories::ATOM_UNDEFINED, false);

    warning!(categories::ATOM_UNDEFINED, "atom does not occur in any rule head");  // Not emitted
    warning!(categories::OPERATION_UNDEFINED, "operation undefined");              // Emitted
    info!("grounding component 3");                                                // Emitted
}
```

## Categories

Category codes are small integers defined in [`categories`]. They mirror the warning kinds of the grounder's
`Logger`; the codes are stable because they index the global enable mask.

# Macros

The following macros are provided for logging at different levels:

 - `error!`
 - `warning!`
 - `info!`
 - `debug!`
 - `trace!`

syntax:

```ignore
// With a category code
level!(category, "format string", args...);

// Without a category (always passed through)
level!("format string", args...);
```

The macros handle logger initialization automatically; no explicit initialization is required. The global category
mask is managed with atomic operations, so the gates are thread safe even though the grounder itself is single
threaded.

*/
mod category_filter;
mod formatter;
mod macros;

use std::sync::{
  atomic::{AtomicU32, Ordering},
  LazyLock,
};

use tracing_subscriber::{fmt, layer::SubscriberExt, Registry};

use category_filter::CategoryFilterLayer;
use formatter::CustomFieldFormatter;
pub use macros::*;

/// Category codes carried by gated log events. These mirror `core::logger::Warnings`.
pub mod categories {
  pub const OPERATION_UNDEFINED: u8 = 0;
  pub const RUNTIME_ERROR: u8 = 1;
  pub const ATOM_UNDEFINED: u8 = 2;
  pub const FILE_INCLUDED: u8 = 3;
  pub const VARIABLE_UNBOUNDED: u8 = 4;
  pub const GLOBAL_VARIABLE: u8 = 5;
  pub const OTHER: u8 = 6;
  pub const COUNT: u8 = 7;
}

/// Used for implicit initialization.
static INIT_LOGGER: LazyLock<()> = LazyLock::new(|| {
  let subscriber = Registry::default()
      .with(CategoryFilterLayer)
      .with(
        fmt::layer()
            .fmt_fields(CustomFieldFormatter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr),
      );

  tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
});

/// This does not need to be called directly. Initializes the logging system.
pub fn init_logger() {
  LazyLock::force(&INIT_LOGGER);
}

/// Bit `i` set means category `i` is enabled. All categories start enabled.
static ENABLED_CATEGORIES: AtomicU32 = AtomicU32::new(u32::MAX);

/// Enables or disables a single category.
pub fn enable_category(category: u8, enabled: bool) {
  debug_assert!(category < categories::COUNT);
  let bit = 1u32 << category;
  if enabled {
    ENABLED_CATEGORIES.fetch_or(bit, Ordering::SeqCst);
  } else {
    ENABLED_CATEGORIES.fetch_and(!bit, Ordering::SeqCst);
  }
}

/// Is the category currently enabled?
pub fn category_enabled(category: u8) -> bool {
  ENABLED_CATEGORIES.load(Ordering::SeqCst) & (1u32 << category) != 0
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_category_gates() {
    enable_category(categories::ATOM_UNDEFINED, false);
    assert!(!category_enabled(categories::ATOM_UNDEFINED));
    assert!(category_enabled(categories::OPERATION_UNDEFINED));

    // Gated: not emitted.
    warning!(categories::ATOM_UNDEFINED, "NOT emitted: atom undefined");
    // Open category: emitted.
    warning!(categories::OPERATION_UNDEFINED, "emitted: operation undefined");
    // No category: always emitted.
    info!("emitted: plain message with value {}", 42);

    enable_category(categories::ATOM_UNDEFINED, true);
    assert!(category_enabled(categories::ATOM_UNDEFINED));
    warning!(categories::ATOM_UNDEFINED, "emitted again after re-enabling");
  }
}
