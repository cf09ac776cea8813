use std::sync::Arc;

use serial_test::serial;
use targetry_lib::context::{BuildContext, ContextValue, ENV_PREFIX, parse_assignment};
use targetry_lib::platform::Os;

use super::common::context_on;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_share_one_map() {
  let build = context_on(Os::Linux);

  let mut handles = Vec::new();
  for i in 0..16 {
    let build = Arc::clone(&build);
    handles.push(tokio::spawn(async move {
      build.set(format!("Key{:02}", i), format!("value-{}", i));
      build.set("LastWriter", format!("{}", i));
    }));
  }
  for handle in handles {
    handle.await.unwrap();
  }

  let keys = build.keys();
  assert_eq!(keys.len(), 17);
  assert_eq!(keys[0], "Key00");
  assert!(build.contains("LastWriter"));
}

#[test]
#[serial]
fn seeds_apply_in_precedence_order() {
  temp_env::with_vars(
    [
      ("TARGETRY_CommitHash", Some("from-env")),
      ("TARGETRY_ReleaseSuffix", Some("from-env")),
      ("TARGETRY_Channel", Some("from-env")),
    ],
    || {
      let build = BuildContext::new(context_on(Os::Linux).platform());
      build.seed_from_env(ENV_PREFIX);
      build
        .seed_from_json(&serde_json::json!({
          "ReleaseSuffix": "from-params",
          "Channel": "from-params",
          "Rids": ["win7-x64", "osx.10.10-x64"],
        }))
        .unwrap();
      build.seed([parse_assignment("Channel=from-set").unwrap()]);

      assert_eq!(build.get_str("CommitHash").unwrap(), "from-env");
      assert_eq!(build.get_str("ReleaseSuffix").unwrap(), "from-params");
      assert_eq!(build.get_str("Channel").unwrap(), "from-set");
      assert_eq!(build.get_list("Rids").unwrap(), vec!["win7-x64", "osx.10.10-x64"]);
    },
  );
}

#[test]
fn snapshot_is_sorted_and_typed() {
  let build = context_on(Os::Linux);
  build.set("Zeta", "z");
  build.set("Alpha", std::path::PathBuf::from("/tmp/alpha"));

  let snapshot = build.snapshot();
  let keys: Vec<_> = snapshot.keys().cloned().collect();
  assert_eq!(keys, vec!["Alpha", "Zeta"]);
  assert!(matches!(snapshot["Alpha"], ContextValue::Path(_)));
  assert_eq!(build.remove("Zeta"), Some(ContextValue::from("z")));
  assert!(!build.contains("Zeta"));
}
