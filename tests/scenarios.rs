use moneta::config::{DATA_DIR, MEMORY_FILE};
use moneta::{Memories, MemoryError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

fn open_temp() -> (tempfile::TempDir, Memories) {
    let dir = tempfile::tempdir().unwrap();
    let mem = Memories::init(dir.path()).unwrap();
    (dir, mem)
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|t| t.to_string()).collect()
}

#[test]
fn work_question_finds_the_nurse_memory() {
    let (_dir, mem) = open_temp();
    let nurse = mem.add_memory("I work as a nurse", &[]).unwrap();
    mem.add_memory("I enjoy hiking on weekends", &[]).unwrap();
    mem.add_memory("My favorite food is sushi", &[]).unwrap();

    let results = mem.search_memories("What do I do for work?", 3, 0.2);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.id, nurse.id);
    assert!(results[0].relevance_score > 0.5);
}

#[test]
fn hiking_memories_connect_and_unrelated_ones_do_not() {
    let (_dir, mem) = open_temp();
    let a = mem.add_memory("I like hiking", &[]).unwrap();
    let b = mem.add_memory("I enjoy hiking trails", &[]).unwrap();
    let c = mem.add_memory("My favorite food is sushi", &[]).unwrap();
    let d = mem.add_memory("I work as a nurse", &[]).unwrap();

    let (connections, matrix) = mem.calculate_all_scores_and_connections(0.3).unwrap();

    assert_eq!(matrix.len(), 4);
    assert_eq!(connections[&a.id].len(), 1);
    assert_eq!(connections[&a.id][0].id, b.id);
    assert_eq!(connections[&b.id][0].id, a.id);
    assert!(connections[&c.id].is_empty());
    assert!(connections[&d.id].is_empty());
}

#[test]
fn deleting_a_missing_id_changes_nothing() {
    let (_dir, mem) = open_temp();
    mem.add_memory("I like tea", &[]).unwrap();

    assert!(!mem.delete_memory("no-such-id").unwrap());
    assert_eq!(mem.get_all_memories().len(), 1);
}

#[test]
fn delete_removes_memory_from_search_and_network() {
    let (_dir, mem) = open_temp();
    let a = mem.add_memory("I like hiking trails", &[]).unwrap();
    let b = mem.add_memory("I enjoy hiking trails", &[]).unwrap();

    assert!(mem.delete_memory(&a.id).unwrap());

    let results = mem.search_memories("hiking", 5, 0.0);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.id, b.id);

    let (connections, _) = mem.calculate_all_scores_and_connections(0.0).unwrap();
    assert!(!connections.contains_key(&a.id));
    assert!(connections[&b.id].iter().all(|c| c.id != a.id));
}

#[test]
fn search_reinforces_returned_memories() {
    let (_dir, mem) = open_temp();
    let tea = mem.add_memory("I like green tea", &[]).unwrap();
    let car = mem.add_memory("I drive a blue car", &[]).unwrap();

    let before = mem.get(&tea.id).unwrap();
    let results = mem.search_memories("green tea", 5, 0.1);
    let after = mem.get(&tea.id).unwrap();

    assert_eq!(results.len(), 1);
    assert!(after.score > before.score);
    assert_eq!(after.access_count, before.access_count + 1);
    assert!(after.last_accessed >= before.last_accessed);

    let untouched = mem.get(&car.id).unwrap();
    assert_eq!(untouched.access_count, 0);
    assert_eq!(untouched.score, 0.0);
}

#[test]
fn ranking_is_stable_on_a_frozen_corpus() {
    let (_dir, mem) = open_temp();
    mem.add_memory("Tea with milk", &[]).unwrap();
    mem.add_memory("Green tea in the morning", &[]).unwrap();
    mem.add_memory("Tea ceremonies in Kyoto", &[]).unwrap();
    mem.add_memory("Coffee at noon", &[]).unwrap();

    // Browse mode does not reinforce, so repeated calls see identical state
    let first = mem.search_memories("", 10, 0.0);
    let second = mem.search_memories("", 10, 0.0);
    let order = |r: &[moneta::RankedResult]| -> Vec<String> {
        r.iter().map(|x| x.memory.id.clone()).collect()
    };
    assert_eq!(order(&first), order(&second));

    // The shortest tea memory carries the most weight on "tea"
    let ranked = mem.search_memories("tea", 10, 0.1);
    let contents: Vec<&str> = ranked.iter().map(|r| r.memory.content.as_str()).collect();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0], "Tea with milk");
    assert!(!contents.contains(&"Coffee at noon"));
}

#[test]
fn empty_store_is_safe() {
    let (_dir, mem) = open_temp();

    assert!(mem.search_memories("anything", 5, 0.0).is_empty());
    assert!(mem.search_memories("", 5, 0.0).is_empty());
    assert!(mem.calculate_all_scores_and_connections(0.3).is_none());
    assert!(mem.memory_network(0.3).nodes.is_empty());
    assert!(mem.get_all_memories().is_empty());
}

#[test]
fn empty_content_is_rejected() {
    let (_dir, mem) = open_temp();
    assert!(matches!(
        mem.add_memory("   ", &tags(&["pref"])),
        Err(MemoryError::InvalidInput(_))
    ));
}

#[test]
fn memories_survive_reload() {
    let (dir, mem) = open_temp();
    let added = mem.add_memory("I like tea", &tags(&["pref"])).unwrap();

    mem.reload_from_disk();
    let all = mem.get_all_memories();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "I like tea");
    assert_eq!(all[0].tags, vec!["pref"]);

    let reopened = Memories::open_at(dir.path().join(DATA_DIR)).unwrap();
    let again = reopened.get(&added.id).unwrap();
    assert_eq!(again.created, added.created);
    assert_eq!(again.tags, added.tags);
}

#[test]
fn add_is_visible_to_an_immediate_search() {
    let (_dir, mem) = open_temp();
    mem.add_memory("My sister lives in Lisbon", &[]).unwrap();
    let added = mem.add_memory("I am learning Portuguese", &[]).unwrap();

    let results = mem.search_memories("portuguese lessons", 5, 0.2);
    assert_eq!(results[0].memory.id, added.id);
}

#[test]
fn reload_picks_up_external_edits_and_survives_corruption() {
    let (dir, mem) = open_temp();
    mem.add_memory("I like tea", &[]).unwrap();

    let other = Memories::open_at(dir.path().join(DATA_DIR)).unwrap();
    other.add_memory("I like coffee", &[]).unwrap();

    mem.reload_from_disk();
    assert_eq!(mem.get_all_memories().len(), 2);

    std::fs::write(dir.path().join(DATA_DIR).join(MEMORY_FILE), "{ broken").unwrap();
    mem.reload_from_disk();
    assert_eq!(mem.get_all_memories().len(), 2);
}

#[test]
fn connections_shrink_as_threshold_rises() {
    let (_dir, mem) = open_temp();
    for content in [
        "Green tea in the morning",
        "Green tea leaves from Japan",
        "Tea leaves and coffee beans",
        "Coffee in the morning",
        "A morning run by the river",
        "River fishing trips",
    ] {
        mem.add_memory(content, &[]).unwrap();
    }

    let edge_set = |threshold: f64| -> BTreeSet<(String, String)> {
        let (connections, _) = mem.calculate_all_scores_and_connections(threshold).unwrap();
        let edges: BTreeSet<(String, String)> = connections
            .iter()
            .flat_map(|(id, neighbors)| neighbors.iter().map(move |c| (id.clone(), c.id.clone())))
            .collect();
        edges
    };

    let mut previous = edge_set(0.0);
    for threshold in [0.1, 0.2, 0.3, 0.4, 0.6, 0.9] {
        let current = edge_set(threshold);
        assert!(current.is_subset(&previous));
        previous = current;
    }
}

#[test]
fn concurrent_adds_searches_and_deletes_stay_consistent() {
    let (_dir, mem) = open_temp();
    let mem = Arc::new(mem);

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let mem = Arc::clone(&mem);
            thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..20 {
                    let m = mem
                        .add_memory(&format!("writer {} remembers item {}", w, i), &[])
                        .unwrap();
                    if i % 2 == 0 {
                        assert!(mem.delete_memory(&m.id).unwrap());
                    } else {
                        kept.push(m.id);
                    }
                }
                kept
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let mem = Arc::clone(&mem);
            thread::spawn(move || {
                for _ in 0..20 {
                    for r in mem.search_memories("remembers item", 50, 0.0) {
                        assert!(r.memory.score >= 0.0);
                    }
                    if let Some((connections, matrix)) = mem.calculate_all_scores_and_connections(0.5) {
                        assert_eq!(connections.len(), matrix.len());
                    }
                }
            })
        })
        .collect();

    let mut kept: BTreeSet<String> = BTreeSet::new();
    for handle in writers {
        kept.extend(handle.join().unwrap());
    }
    for handle in readers {
        handle.join().unwrap();
    }

    let all: BTreeSet<String> = mem.get_all_memories().into_iter().map(|m| m.id).collect();
    assert_eq!(all, kept);

    let queued = mem.drain_new_memories();
    assert_eq!(queued.len(), kept.len());
}
