//! Shared helpers for library integration tests.

use std::sync::{Arc, Mutex};

use targetry_lib::context::{BuildContext, TargetContext};
use targetry_lib::platform::{Arch, Os, Platform};
use targetry_lib::target::{Target, TargetError};

/// Names of invoked bodies, in invocation order.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
  pub fn push(&self, name: &str) {
    self.0.lock().unwrap().push(name.to_string());
  }

  pub fn names(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }

  pub fn count(&self, name: &str) -> usize {
    self.0.lock().unwrap().iter().filter(|n| *n == name).count()
  }
}

/// A target that records its invocation and succeeds.
pub fn recording(name: &str, deps: &[&str], calls: &Calls) -> Target {
  let calls = calls.clone();
  Target::new(name, move |ctx: TargetContext| {
    let calls = calls.clone();
    async move {
      calls.push(ctx.name());
      Ok(())
    }
  })
  .depends_on(deps)
}

/// A target that records its invocation and fails.
pub fn failing(name: &str, deps: &[&str], calls: &Calls) -> Target {
  let calls = calls.clone();
  Target::new(name, move |ctx: TargetContext| {
    let calls = calls.clone();
    async move {
      calls.push(ctx.name());
      Err(TargetError::failed(format!("{} broke", ctx.name())))
    }
  })
  .depends_on(deps)
}

pub fn context_on(os: Os) -> Arc<BuildContext> {
  Arc::new(BuildContext::new(Platform::new(Arch::X86_64, os)))
}
