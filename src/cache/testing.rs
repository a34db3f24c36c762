//! Cache stand-in whose writes can be made to fail.

use crate::error::{Error, Result};

use super::ResponseCache;

/// Always misses; `remove` and `flush_by_tag` fail when asked to.
#[derive(Default)]
pub struct FailingCache {
  pub fail_remove: bool,
  pub fail_flush_by_tag: bool,
}

impl ResponseCache for FailingCache {
  fn get(&self, _key: &str) -> Result<Option<String>> {
    Ok(None)
  }

  fn set(&self, _key: &str, _value: &str, _tags: &[&str]) -> Result<()> {
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    if self.fail_remove {
      return Err(Error::Cache(format!("cannot remove {}", key)));
    }
    Ok(())
  }

  fn flush(&self) -> Result<()> {
    Ok(())
  }

  fn flush_by_tag(&self, tag: &str) -> Result<()> {
    if self.fail_flush_by_tag {
      return Err(Error::Cache(format!("cannot flush tag {}", tag)));
    }
    Ok(())
  }
}
