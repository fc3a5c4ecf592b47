use super::settings::EloSettings;
use crate::rating_store::{Rating, RatingUpdate};

/// Probability that a track rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

pub fn k_factor(settings: &EloSettings, winner: &Rating, loser: &Rating) -> f64 {
    if winner.games < settings.provisional_games || loser.games < settings.provisional_games {
        settings.k_provisional
    } else {
        settings.k_established
    }
}

/// Zero sum update: whatever the winner gains the loser loses.
pub fn apply_result(settings: &EloSettings, winner: &Rating, loser: &Rating) -> RatingUpdate {
    let expected = expected_score(winner.rating, loser.rating);
    let delta = k_factor(settings, winner, loser) * (1.0 - expected);
    RatingUpdate {
        winner: Rating {
            rating: winner.rating + delta,
            games: winner.games.saturating_add(1),
        },
        loser: Rating {
            rating: loser.rating - delta,
            games: loser.games.saturating_add(1),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(rating: f64, games: u32) -> Rating {
        Rating { rating, games }
    }

    #[test]
    fn fresh_tracks_move_by_sixteen() {
        let update = apply_result(
            &EloSettings::default(),
            &rating(1500.0, 0),
            &rating(1500.0, 0),
        );
        assert!((update.winner.rating - 1516.0).abs() < 1e-9);
        assert!((update.loser.rating - 1484.0).abs() < 1e-9);
        assert_eq!(update.winner.games, 1);
        assert_eq!(update.loser.games, 1);
    }

    #[test]
    fn established_tracks_use_lower_k() {
        let settings = EloSettings::default();
        assert_eq!(
            k_factor(&settings, &rating(1500.0, 10), &rating(1500.0, 10)),
            16.0
        );
        assert_eq!(
            k_factor(&settings, &rating(1500.0, 10), &rating(1500.0, 9)),
            32.0
        );
        assert_eq!(
            k_factor(&settings, &rating(1500.0, 3), &rating(1500.0, 40)),
            32.0
        );

        let update = apply_result(&settings, &rating(1500.0, 12), &rating(1500.0, 20));
        assert!((update.winner.rating - 1508.0).abs() < 1e-9);
    }

    #[test]
    fn upsets_are_worth_more() {
        let settings = EloSettings::default();
        let favourite_wins = apply_result(&settings, &rating(1700.0, 0), &rating(1300.0, 0));
        let underdog_wins = apply_result(&settings, &rating(1300.0, 0), &rating(1700.0, 0));
        let favourite_gain = favourite_wins.winner.rating - 1700.0;
        let underdog_gain = underdog_wins.winner.rating - 1300.0;
        assert!(favourite_gain > 0.0);
        assert!(underdog_gain > favourite_gain);
        // 1 / (1 + 10^-1) of K goes unearned by the favourite
        assert!((favourite_gain - 32.0 * (1.0 - 1.0 / 1.1)).abs() < 1e-9);
    }

    #[test]
    fn updates_are_zero_sum() {
        let settings = EloSettings::default();
        let pairs = [
            (rating(1500.0, 0), rating(1500.0, 0)),
            (rating(1832.5, 14), rating(1201.25, 3)),
            (rating(900.0, 40), rating(2100.0, 50)),
        ];
        for (winner, loser) in pairs {
            let update = apply_result(&settings, &winner, &loser);
            let before = winner.rating + loser.rating;
            let after = update.winner.rating + update.loser.rating;
            assert!((before - after).abs() < 1e-9);
        }
    }

    #[test]
    fn expected_scores_are_complementary() {
        let p = expected_score(1600.0, 1450.0);
        let q = expected_score(1450.0, 1600.0);
        assert!((p + q - 1.0).abs() < 1e-12);
        assert!((expected_score(1500.0, 1500.0) - 0.5).abs() < 1e-12);
    }
}
