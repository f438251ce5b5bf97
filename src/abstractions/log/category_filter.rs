use std::fmt::Debug;
use tracing::{
  field::{Field, Visit},
  Event,
  Subscriber,
};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use super::{categories, category_enabled};

/// A "layer" that causes the logging system to drop messages whose warning category is disabled.
/// This baroque machinery is specific to the `tracing` crate.
pub(crate) struct CategoryFilterLayer;

impl<S> Layer<S> for CategoryFilterLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
  fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
    let mut visitor = CategoryVisitor { category: None };
    event.record(&mut visitor);

    match visitor.category {
      // Proceed to log the event by passing it to the next layer, or filter it out.
      Some(category) => category_enabled(category),
      // No category provided; default behavior is to log the event.
      None => true,
    }
  }
}

/// A "visitor" used for extracting the category from log records. Used by `CategoryFilterLayer`, this is how
/// the `tracing` crate does things.
struct CategoryVisitor {
  category: Option<u8>,
}

impl Visit for CategoryVisitor {
  fn record_i64(&mut self, field: &Field, value: i64) {
    if field.name() == "category" {
      if value >= 0 && value < categories::COUNT as i64 {
        self.category = Some(value as u8);
      } else {
        panic!("Invalid category code supplied to the logger: {:?} This is an error.", value);
      }
    }
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    if field.name() == "category" {
      if value < categories::COUNT as u64 {
        self.category = Some(value as u8);
      } else {
        panic!("Invalid category code supplied to the logger: {:?} This is an error.", value);
      }
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
    if field.name() == "category" {
      // This is an error.
      panic!("Invalid category code supplied to the logger: {:?} This is an error.", value);
    }
  }
}
