use proptest::prelude::*;
use routeplane::keys::{join, last_segment, parent_path, Family, KeyLayout};

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.\\-]{1,24}"
}

fn root() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9]{1,8}", 1..3).prop_map(|parts| format!("/{}", parts.join("/")))
}

proptest! {
    #[test]
    fn join_then_last_segment(base in root(), id in segment()) {
        let path = join(&base, [id.as_str()]);
        prop_assert_eq!(last_segment(&path), id.as_str());
        prop_assert_eq!(parent_path(&path), base.as_str());
    }

    #[test]
    fn record_keys_match_back_to_their_family(base in root(), id in segment()) {
        let layout = KeyLayout::new(base).unwrap();
        for family in [Family::Host, Family::Listener, Family::Frontend, Family::Backend] {
            let key = layout.record_key(family, &id);
            let matched = layout.match_key(&key).unwrap();
            prop_assert_eq!(matched.family, family);
            prop_assert_eq!(matched.id, id.clone());
            prop_assert!(!matched.marker);
            prop_assert!(matched.parent_id.is_none());
        }
    }

    #[test]
    fn child_keys_carry_both_ids(base in root(), parent in segment(), id in segment()) {
        let layout = KeyLayout::new(base).unwrap();

        let matched = layout.match_key(&layout.server_key(&parent, &id)).unwrap();
        prop_assert_eq!(matched.family, Family::Server);
        prop_assert_eq!(matched.parent_id.as_deref(), Some(parent.as_str()));
        prop_assert_eq!(matched.id, id.clone());

        let matched = layout.match_key(&layout.middleware_key(&parent, &id)).unwrap();
        prop_assert_eq!(matched.family, Family::Middleware);
        prop_assert_eq!(matched.parent_id.as_deref(), Some(parent.as_str()));
        prop_assert_eq!(matched.id, id);
    }

    #[test]
    fn entity_dirs_are_markers(base in root(), id in segment()) {
        let layout = KeyLayout::new(base).unwrap();
        for family in [Family::Host, Family::Frontend, Family::Backend] {
            let matched = layout.match_key(&layout.entity_dir(family, &id)).unwrap();
            prop_assert_eq!(matched.family, family);
            prop_assert!(matched.marker);
        }
    }

    #[test]
    fn keys_under_other_roots_never_match(base in root(), id in segment()) {
        let layout = KeyLayout::new(base.clone()).unwrap();
        let foreign = format!("{}x/hosts/{}/host", base, id);
        prop_assert!(layout.match_key(&foreign).is_none());
    }
}
