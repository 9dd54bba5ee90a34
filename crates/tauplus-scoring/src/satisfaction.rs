use tauplus_trajectory::{Sentiment, Trajectory, UserSignal};

const POSITIVE_MARKERS: &[&str] = &[
  "thank",
  "great",
  "perfect",
  "appreciate",
  "helpful",
  "excellent",
  "wonderful",
  "awesome",
];

const NEGATIVE_MARKERS: &[&str] = &[
  "frustrat",
  "annoy",
  "unacceptable",
  "terrible",
  "useless",
  "disappoint",
  "ridiculous",
  "not helpful",
  "waste of time",
];

/// Satisfaction from the user's terminal signal.
///
/// Without an explicit signal, the final user message is read against a small
/// sentiment lexicon; no markers at all is neutral.
pub fn user_satisfaction(trajectory: &Trajectory) -> f64 {
  match trajectory.user_signal {
    Some(UserSignal::Rating(rating)) => rating.clamp(0.0, 1.0),
    Some(UserSignal::Sentiment(sentiment)) => sentiment_score(sentiment),
    None => match trajectory.last_user_message() {
      Some(message) => lexicon_score(&message.content),
      None => 0.0,
    },
  }
}

pub fn sentiment_score(sentiment: Sentiment) -> f64 {
  match sentiment {
    Sentiment::Positive => 1.0,
    Sentiment::Neutral => 0.5,
    Sentiment::Negative => 0.0,
  }
}

fn lexicon_score(content: &str) -> f64 {
  let lowered = content.to_lowercase();
  let positive = POSITIVE_MARKERS.iter().filter(|m| lowered.contains(*m)).count();
  let negative = NEGATIVE_MARKERS.iter().filter(|m| lowered.contains(*m)).count();
  if positive + negative == 0 {
    return 0.5;
  }
  0.5 + 0.5 * (positive as f64 - negative as f64) / (positive + negative) as f64
}
