mod common;

use common::{engine, new_session, story, summary, CannedProvider};
use storyloom::engine::{CompactionOutcome, CompactionStrategy};
use storyloom::StoryloomError;

#[tokio::test]
async fn test_opening_then_one_action() {
    let provider = CannedProvider::new([
        story("You wake in a cellar. A door stands shut.", "Woke in a cellar."),
        story("The door creaks open onto a stair.", "Opened the cellar door."),
    ]);
    let engine = engine(&provider);
    let mut session = new_session("Mira");

    engine.open(&mut session, "a flooded cellar").await.unwrap();
    engine.advance(&mut session, "open the door").await.unwrap();

    assert_eq!(session.history_descriptions.len(), 2);
    assert_eq!(session.history_choices, vec!["open the door".to_string()]);
    assert_eq!(session.summaries.len(), 2);
    assert_eq!(
        session.current_description,
        "The door creaks open onto a stair."
    );
    assert_eq!(session.tokens.consumes, vec![50, 50]);
    assert_eq!(session.tokens.total, 100);
    assert_eq!(session.conversation_log.len(), 4);
}

#[tokio::test]
async fn test_history_invariant_over_many_turns() {
    let mut replies = vec![story("Turn 0.", "s0")];
    for i in 1..=6 {
        replies.push(story(&format!("Turn {}.", i), &format!("s{}", i)));
    }
    let provider = CannedProvider::new(replies);
    let engine = engine(&provider);
    let mut session = new_session("Mira");

    engine.open(&mut session, "").await.unwrap();
    for i in 1..=6 {
        engine
            .advance(&mut session, &format!("step {}", i))
            .await
            .unwrap();
        assert_eq!(
            session.history_descriptions.len(),
            session.history_choices.len() + 1
        );
        assert_eq!(session.summaries.len(), session.history_descriptions.len());
    }
    assert_eq!(session.latest_summary(), "s6");
}

#[tokio::test]
async fn test_unparseable_turn_changes_nothing() {
    let mut replies = vec![story("Start.", "start")];
    replies.extend(std::iter::repeat("I cannot answer in JSON today.".to_string()).take(5));
    let provider = CannedProvider::new(replies);
    let engine = engine(&provider);
    let mut session = new_session("Mira");
    engine.open(&mut session, "").await.unwrap();

    let err = engine.advance(&mut session, "sing").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoryloomError>(),
        Some(StoryloomError::RetryExhausted { attempts: 5, .. })
    ));
    assert_eq!(session.history_descriptions, vec!["Start.".to_string()]);
    assert!(session.history_choices.is_empty());
    assert_eq!(session.summaries, vec!["start".to_string()]);
    assert_eq!(session.last_response, "I cannot answer in JSON today.");
}

#[tokio::test]
async fn test_dilution_at_threshold() {
    let large: Vec<String> = (0..25)
        .map(|i| format!("Chapter {:02}: {}", i, "the road goes on. ".repeat(20)))
        .collect();
    let provider = CannedProvider::new([
        summary("Chapters one to ten, retold."),
        story("You reach the river.", "Reached the river."),
    ]);
    let engine = engine(&provider);
    let mut session = new_session("Mira");
    session.history_descriptions = vec!["...".to_string(); 25];
    session.history_choices = vec!["walk".to_string(); 24];
    session.current_description = "...".to_string();
    session.tokens.consumes = vec![10; 25];
    session.summaries = large.clone();
    session.compaction_cooldown = 0;

    let outcome = engine.advance(&mut session, "keep walking").await.unwrap();

    assert_eq!(
        outcome.compaction,
        CompactionOutcome::Completed(CompactionStrategy::Dilution)
    );
    // one merged summary plus the fifteen kept, then this turn's own summary
    assert_eq!(session.summaries.len(), 17);
    assert_eq!(session.summaries[0], "Chapters one to ten, retold.");
    assert_eq!(&session.summaries[1..16], &large[10..]);
    assert_eq!(session.summaries[16], "Reached the river.");
    assert_eq!(session.compaction_cooldown, 9);
    assert_eq!(session.tokens.consumes[24], 60);
    assert_eq!(session.history_choices.last().unwrap(), "keep walking");
}

#[tokio::test]
async fn test_repaired_reply_is_accepted() {
    let provider = CannedProvider::new([
        "Sure! Here is the scene:\n```json\n{description: '风起了。你听见有人喊你的名字。', summary: 'Wind rose',}\n```",
    ]);
    let engine = engine(&provider);
    let mut session = new_session("Mira");
    engine.open(&mut session, "").await.unwrap();
    assert_eq!(
        session.current_description,
        "风起了。\n你听见有人喊你的名字。\n"
    );
    assert_eq!(session.latest_summary(), "Wind rose");
}
