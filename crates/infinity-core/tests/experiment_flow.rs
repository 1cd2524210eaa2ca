//! Drives complete runs through the page state machine, request by request

use infinity_core::loader::StimulusLoader;
use infinity_core::{
    Analyzer, Condition, ExperimentConfig, ExperimentFlow, ExperimentRequest, ExperimentStep,
    FlatFileStore, PageView, SetKind,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const SEED_WORDS: [&str; 3] = ["cat", "dog", "bird"];

fn setup(condition: Condition) -> (TempDir, ExperimentFlow) {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(ExperimentConfig {
        set_size: 3,
        ..ExperimentConfig::rooted_at(dir.path())
    });
    let store = FlatFileStore::new(&config.data_dir);

    let seed = |set: SetKind, content: String| {
        let path = store.set_path(condition, "B", 0, set);
        store.ensure(&path).unwrap();
        store.write(&path, &content).unwrap();
    };
    seed(
        SetKind::Dynamic,
        SEED_WORDS
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{}\t{},20\t100,200\t300,400\t09:00:0{}", w, 20 + i, i))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    seed(
        SetKind::Stable,
        ["kiki", "bouba", "wug"]
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{}|||{}\t{},30\t110,210\t310,410\t09:01:0{}", i, w, 30 + i, i))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    store.provision(condition, "B", 1..=2).unwrap();

    fs::create_dir_all(&config.vocalization_dir).unwrap();
    for word in SEED_WORDS {
        fs::write(config.vocalization_dir.join(format!("{}.m4a", word)), b"").unwrap();
    }

    (dir, ExperimentFlow::new(config))
}

/// Answer every page the way a participant would until the run completes
fn run_to_completion(flow: &ExperimentFlow, condition: Condition, generation: u32) -> Vec<PageView> {
    let mut rng = StdRng::seed_from_u64(u64::from(generation) * 31);
    let mut views = Vec::new();
    let mut request = ExperimentRequest::begin("B", generation, condition);
    let mut answers = 0;

    loop {
        let ExperimentStep { view, next } = flow.step(&request, &mut rng).unwrap();
        views.push(view.clone());
        let Some(state) = next else { break };

        request = match &view {
            PageView::Training(page) => {
                let correct = u32::from(page.index != 1);
                ExperimentRequest::from_state(&state, None, correct)
            }
            PageView::Test(page) => {
                answers += 1;
                let answer = format!("{}{}", page.position.set, answers);
                ExperimentRequest::from_state(&state, Some(&answer), 0)
            }
            _ => ExperimentRequest::from_state(&state, None, 0),
        };
    }
    views
}

#[test]
fn full_run_of_three_stimuli() {
    let (_dir, flow) = setup(Condition::One);
    let config = flow.config().clone();

    let validation = flow.validate("B", "1", "1");
    assert!(validation.next.is_some());

    let views = run_to_completion(&flow, Condition::One, 1);
    let kinds: Vec<&str> = views
        .iter()
        .map(|v| match v {
            PageView::Welcome { .. } => "welcome",
            PageView::Training(_) => "training",
            PageView::Break { .. } => "break",
            PageView::Test(_) => "test",
            PageView::Complete { .. } => "complete",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "welcome", "training", "training", "training", "break", "test", "test", "test",
            "test", "test", "test", "complete"
        ]
    );

    // training shows the previous generation's dynamic words and vocalizations
    for view in &views {
        if let PageView::Training(page) = view {
            assert_eq!(page.word, SEED_WORDS[page.index]);
            assert!(page.audio.ends_with(&format!("{}.m4a", page.word)));
            assert_eq!(page.triangle.a.x, 20 + page.index as i32);
        }
        if let PageView::Test(page) = view {
            assert!(page.used_words.is_empty());
            if page.position.set == SetKind::Stable {
                assert_eq!(page.triangle.a.x, 30 + page.position.index as i32);
            }
        }
    }

    // one of three training items was answered wrong
    match &views[4] {
        PageView::Break { score, .. } => assert_eq!(*score, 2),
        other => panic!("expected break, got {:?}", other),
    }

    let store = FlatFileStore::new(&config.data_dir);
    let loader = StimulusLoader::new(store.clone());

    let dynamic = loader
        .load_records(Condition::One, "B", 1, SetKind::Dynamic)
        .unwrap();
    assert_eq!(dynamic.len(), 3);
    assert!(dynamic.iter().all(|r| r.word.starts_with('d')));

    let stable = loader
        .load_records(Condition::One, "B", 1, SetKind::Stable)
        .unwrap();
    let indices: Vec<usize> = stable.iter().map(|r| r.stimulus.unwrap()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    let mut orders: Vec<usize> = stable.iter().map(|r| r.order.unwrap()).collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![1, 2, 3]);
    for record in &stable {
        assert_eq!(record.triangle.a.x, 30 + record.stimulus.unwrap() as i32);
    }

    let scores = store.read(&config.scores_file).unwrap();
    assert!(scores.as_str().starts_with("1\tB\t1\t2\t"));

    let status = flow.status().unwrap().unwrap();
    assert_eq!(status.run.to_string(), "1||B||1");
    assert_eq!(status.dynamic_answers, 3);
    assert_eq!(status.stable_answers, 3);

    let analysis = Analyzer::new(loader).analyze(Condition::One, "B", 1).unwrap();
    assert!(analysis.transmission_error > 0.0);
    assert_eq!(analysis.expressivity.combined, 6);
}

#[test]
fn second_generation_learns_from_the_first() {
    let (_dir, flow) = setup(Condition::One);
    run_to_completion(&flow, Condition::One, 1);

    // generation 1 words now need vocalizations before generation 2 may start
    let report = flow.validate("B", "2", "1");
    assert!(report.next.is_none());

    let words = StimulusLoader::new(flow.store().clone())
        .load_words(Condition::One, "B", 1, SetKind::Dynamic)
        .unwrap();
    for word in &words {
        fs::write(
            flow.config().vocalization_dir.join(format!("{}.m4a", word)),
            b"",
        )
        .unwrap();
    }
    assert!(flow.validate("B", "2", "1").next.is_some());

    let views = run_to_completion(&flow, Condition::One, 2);
    assert!(matches!(views.last(), Some(PageView::Complete { .. })));
}

#[test]
fn condition_two_offers_used_words() {
    let (_dir, flow) = setup(Condition::Two);
    let views = run_to_completion(&flow, Condition::Two, 1);

    match &views[4] {
        PageView::Break {
            no_repeat_reminder, ..
        } => assert!(*no_repeat_reminder),
        other => panic!("expected break, got {:?}", other),
    }

    let used: Vec<usize> = views
        .iter()
        .filter_map(|v| match v {
            PageView::Test(page) if page.position.set == SetKind::Dynamic => {
                Some(page.used_words.len())
            }
            _ => None,
        })
        .collect();
    assert_eq!(used, vec![0, 1, 2]);
}

#[test]
fn begin_clears_a_previous_attempt() {
    let (_dir, flow) = setup(Condition::One);
    run_to_completion(&flow, Condition::One, 1);

    let mut rng = StdRng::seed_from_u64(99);
    let step = flow
        .step(&ExperimentRequest::begin("B", 1, Condition::One), &mut rng)
        .unwrap();
    assert!(matches!(step.view, PageView::Welcome { .. }));

    let status = flow.status().unwrap().unwrap();
    assert_eq!(status.dynamic_answers, 0);
    assert_eq!(status.stable_answers, 0);
}

#[test]
fn replayed_request_serves_the_same_page() {
    let (_dir, flow) = setup(Condition::One);
    let mut rng = StdRng::seed_from_u64(5);
    let welcome = flow
        .step(&ExperimentRequest::begin("B", 1, Condition::One), &mut rng)
        .unwrap();
    let request = ExperimentRequest::from_state(&welcome.next.unwrap(), None, 0);

    let first = flow.step(&request, &mut rng).unwrap();
    let second = flow.step(&request, &mut rng).unwrap();
    assert_eq!(first, second);
}
