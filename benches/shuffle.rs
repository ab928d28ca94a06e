use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fair_blackjack::core::hash::Secret;
use fair_blackjack::core::rng::derive_combined_seed;
use fair_blackjack::game::{shuffle, BetLimits, BlackjackGame, Deck, GameStage};
use fair_blackjack::proof::{verify_round, RoundTranscript, TRANSCRIPT_VERSION};

fn played_transcript() -> RoundTranscript {
    let house = Secret::from_bytes([0x11; 32]);
    let player = Secret::from_bytes([0x22; 32]);
    let cut = 26;
    let seed = derive_combined_seed(&house, &player, cut);

    let mut deck = Deck::shuffled(&seed);
    let mut game = BlackjackGame::new(1000);
    game.stake(100, &BetLimits::new(10, 1000)).expect("stake");
    game.deal_initial(&mut deck).expect("deal");
    while game.stage() == GameStage::PlayerTurn {
        if game.player().score() < 17 {
            game.hit(&mut deck).expect("hit");
        } else {
            game.stand(&mut deck).expect("stand");
        }
    }

    RoundTranscript {
        version: TRANSCRIPT_VERSION,
        round_id: [7; 16],
        house_cv: house.commit().cv,
        player_cv: player.commit().cv,
        house_secret: house,
        player_secret: player,
        cut,
        seed,
        draws: game.draws().to_vec(),
        moves: game.moves().to_vec(),
        player_cards: game.player().cards().to_vec(),
        dealer_cards: game.dealer().cards().to_vec(),
        bet: game.bet(),
        result: game.result(),
        payout: game.payout(),
    }
}

fn shuffle_bench(c: &mut Criterion) {
    let house = Secret::from_bytes([0x11; 32]);
    let player = Secret::from_bytes([0x22; 32]);

    c.bench_function("derive_seed", |b| {
        b.iter(|| black_box(derive_combined_seed(&house, &player, black_box(26))))
    });

    let seed = derive_combined_seed(&house, &player, 26);
    c.bench_function("shuffle_deck", |b| b.iter(|| black_box(shuffle(black_box(&seed)))));
}

fn verify_bench(c: &mut Criterion) {
    let transcript = played_transcript();
    assert!(verify_round(&transcript).is_verified());

    c.bench_function("verify_round", |b| {
        b.iter(|| black_box(verify_round(black_box(&transcript))))
    });
    c.bench_function("transcript_digest", |b| b.iter(|| black_box(transcript.digest())));
}

criterion_group!(benches, shuffle_bench, verify_bench);
criterion_main!(benches);
