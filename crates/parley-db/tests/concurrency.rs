//! Parallel mutation properties: concurrent togglers and readers on the
//! same message must never lose each other's updates.

use std::sync::Arc;
use std::thread;

use parley_db::Database;

fn open_db(dir: &tempfile::TempDir) -> Arc<Database> {
    Arc::new(Database::open(&dir.path().join("test.db")).unwrap())
}

#[test]
fn parallel_togglers_distinct_emojis_all_survive() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let msg = db.create_message("bob", "r1", "hi", None).unwrap();

    let emojis = ["😊", "🎉", "👍", "🔥", "🚀", "❤️", "😂", "👀"];
    let handles: Vec<_> = emojis
        .into_iter()
        .enumerate()
        .map(|(i, emoji)| {
            let db = db.clone();
            let message_id = msg.id.clone();
            let user = format!("user{i}");
            thread::spawn(move || db.toggle_reaction(&message_id, &user, emoji).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let map = db.toggle_reaction(&msg.id, "observer", "🧪").unwrap();
    for emoji in emojis {
        assert!(map.contains_key(emoji), "lost reaction {emoji}");
        assert_eq!(map.get(emoji).unwrap().len(), 1);
    }
}

#[test]
fn parallel_togglers_same_emoji_distinct_users_all_survive() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let msg = db.create_message("bob", "r1", "hi", None).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = db.clone();
            let message_id = msg.id.clone();
            thread::spawn(move || {
                db.toggle_reaction(&message_id, &format!("user{i}"), "😊").unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rows = db.reactions_for_messages(&[msg.id.clone()]).unwrap();
    assert_eq!(rows.len(), 8);
}

#[test]
fn even_toggle_count_restores_original_state() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let msg = db.create_message("bob", "r1", "hi", None).unwrap();

    // Threads serialize on the writer, so each sees the previous state;
    // an even total of toggles must land back on "absent".
    for _ in 0..2 {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let db = db.clone();
                let message_id = msg.id.clone();
                thread::spawn(move || db.toggle_reaction(&message_id, "alice", "😊").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    let rows = db.reactions_for_messages(&[msg.id.clone()]).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn concurrent_readers_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let msg = db.create_message("bob", "r1", "hi", None).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let db = db.clone();
            let message_id = msg.id.clone();
            thread::spawn(move || db.mark_read(&message_id, &format!("reader{i}")).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let receipts = db.read_by_for_messages(&[msg.id.clone()]).unwrap();
    assert_eq!(receipts.len(), 16);
}
