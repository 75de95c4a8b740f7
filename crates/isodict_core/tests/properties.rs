//! Property-based tests for commit ordering and read-your-writes.

use isodict_core::DictionaryContext;
use isodict_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn apply(model: &mut BTreeMap<String, i64>, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Put { key, value } => {
                model.insert(key.clone(), *value);
            }
            Op::Remove { key } => {
                model.remove(key);
            }
        }
    }
}

fn run(ctx: &mut DictionaryContext<i64>, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Put { key, value } => ctx.add_or_update(key.as_str(), *value).unwrap(),
            Op::Remove { key } => ctx.remove(key.as_str()).unwrap(),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sequential_commits_match_model(txns in transactions_strategy(6, 8)) {
        let dict = memory_dictionary::<i64>();
        let mut model = BTreeMap::new();
        let mut ctx = DictionaryContext::new(Arc::clone(&dict));

        for ops in &txns {
            run(&mut ctx, ops);
            ctx.commit().unwrap();
            apply(&mut model, ops);
        }

        let mut reader = DictionaryContext::new(dict);
        let visible: BTreeMap<_, _> = reader.get_all().unwrap().into_iter().collect();
        prop_assert_eq!(visible, model);
    }

    #[test]
    fn reads_see_own_writes(ops in ops_strategy(16)) {
        let dict = memory_dictionary::<i64>();
        let mut ctx = DictionaryContext::new(dict);
        let mut model = BTreeMap::new();

        for op in &ops {
            run(&mut ctx, std::slice::from_ref(op));
            apply(&mut model, std::slice::from_ref(op));
            prop_assert_eq!(ctx.get(op.key()).unwrap(), model.get(op.key()).copied());
        }
        prop_assert_eq!(ctx.count().unwrap(), model.len());
        ctx.rollback().unwrap();
    }

    #[test]
    fn rollback_never_changes_committed_state(
        committed in ops_strategy(8),
        discarded in ops_strategy(8),
    ) {
        let dict = memory_dictionary::<i64>();
        let mut model = BTreeMap::new();

        let mut ctx = DictionaryContext::new(Arc::clone(&dict));
        run(&mut ctx, &committed);
        ctx.commit().unwrap();
        apply(&mut model, &committed);

        run(&mut ctx, &discarded);
        ctx.rollback().unwrap();

        let mut reader = DictionaryContext::new(dict);
        let visible: BTreeMap<_, _> = reader.get_all().unwrap().into_iter().collect();
        prop_assert_eq!(visible, model);
    }

    #[test]
    fn last_commit_wins_for_each_key(
        first in ops_strategy(8),
        second in ops_strategy(8),
    ) {
        let dict = short_timeout_dictionary::<i64>();

        // `early` opens its transaction while `late` holds the store, so it
        // starts from a snapshot that predates `late`'s commit.
        let mut late = DictionaryContext::new(Arc::clone(&dict));
        let mut early = DictionaryContext::new(Arc::clone(&dict));
        run(&mut late, &second);
        let _ = early.get("probe");
        late.commit().unwrap();
        run(&mut early, &first);
        early.commit().unwrap();

        let mut model = BTreeMap::new();
        apply(&mut model, &second);
        apply(&mut model, &first);

        let mut reader = DictionaryContext::new(dict);
        let visible: BTreeMap<_, _> = reader.get_all().unwrap().into_iter().collect();
        prop_assert_eq!(visible, model);
    }
}
