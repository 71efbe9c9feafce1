//! Authoritative paddle/ball simulation
//!
//! The simulation only knows about two paddles, one ball and the score. Who
//! controls which paddle and when a match is running is decided by the
//! matchmaking layer; this module is driven one fixed tick at a time.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    paddle_start_y, Role, Snapshot, BALL_R, BALL_SPEED, HEIGHT, OUT_MARGIN, PADDLE_H,
    PADDLE_MARGIN, PADDLE_SPEED, PADDLE_W, RETURN_ANGLE_FACTOR, TICK_DT, WIDTH, WIN_SCORE,
};
use std::time::Duration;

/// Longest stretch of wall-clock time credited to the accumulator in one call.
/// A stall longer than this is dropped instead of replayed.
const MAX_FRAME_TIME: f32 = 0.25;

/// Latest directional key state reported by a player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaddleInput {
    pub up: bool,
    pub down: bool,
}

impl PaddleInput {
    /// -1 moving up, +1 moving down, 0 idle or both held.
    pub fn direction(&self) -> f32 {
        f32::from(u8::from(self.down)) - f32::from(u8::from(self.up))
    }
}

/// What happened during a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Rally,
    Point(Role),
    Won(Role),
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u64,
    pub ly: f32,
    pub ry: f32,
    pub bx: f32,
    pub by: f32,
    pub vx: f32,
    pub vy: f32,
    pub sl: u32,
    pub sr: u32,
    rng: StdRng,
}

impl GameState {
    pub fn new(rng: StdRng) -> Self {
        let mut state = Self {
            tick: 0,
            ly: paddle_start_y(),
            ry: paddle_start_y(),
            bx: WIDTH / 2.0,
            by: HEIGHT / 2.0,
            vx: BALL_SPEED,
            vy: BALL_SPEED * 0.3,
            sl: 0,
            sr: 0,
            rng,
        };
        state.reset(true);
        state
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Centers paddles and ball and serves in a random direction.
    ///
    /// A full reset also zeroes the score.
    pub fn reset(&mut self, full: bool) {
        self.ly = paddle_start_y();
        self.ry = paddle_start_y();
        self.serve(None);
        if full {
            self.sl = 0;
            self.sr = 0;
        }
    }

    /// Puts the ball back in the center with a fresh randomized velocity.
    ///
    /// `toward` forces the horizontal direction; `None` flips a coin.
    pub fn serve(&mut self, toward: Option<Role>) {
        self.bx = WIDTH / 2.0;
        self.by = HEIGHT / 2.0;

        let rightward = match toward {
            Some(Role::Left) => false,
            Some(Role::Right) => true,
            _ => self.rng.gen_bool(0.5),
        };
        let angle = 0.15 + self.rng.gen_range(0.0..0.30);
        let downward = self.rng.gen_bool(0.5);

        self.vx = if rightward { BALL_SPEED } else { -BALL_SPEED };
        self.vy = BALL_SPEED * angle * if downward { 1.0 } else { -1.0 };
    }

    /// Advances the simulation by exactly `dt` seconds.
    pub fn step(&mut self, dt: f32, left: PaddleInput, right: PaddleInput) -> StepOutcome {
        self.tick += 1;

        self.ly = (self.ly + left.direction() * PADDLE_SPEED * dt).clamp(0.0, HEIGHT - PADDLE_H);
        self.ry = (self.ry + right.direction() * PADDLE_SPEED * dt).clamp(0.0, HEIGHT - PADDLE_H);

        self.bx += self.vx * dt;
        self.by += self.vy * dt;

        if self.by - BALL_R <= 0.0 {
            self.by = BALL_R;
            self.vy = -self.vy;
        } else if self.by + BALL_R >= HEIGHT {
            self.by = HEIGHT - BALL_R;
            self.vy = -self.vy;
        }

        let left_face = PADDLE_MARGIN + PADDLE_W;
        let right_face = WIDTH - PADDLE_MARGIN - PADDLE_W;

        if self.vx < 0.0 && self.bx - BALL_R <= left_face && self.hits_paddle(self.ly) {
            self.bx = left_face + BALL_R;
            self.vx = -self.vx;
            self.vy = return_vy(self.by, self.ly);
        }

        if self.vx > 0.0 && self.bx + BALL_R >= right_face && self.hits_paddle(self.ry) {
            self.bx = right_face - BALL_R;
            self.vx = -self.vx;
            self.vy = return_vy(self.by, self.ry);
        }

        if self.bx < -OUT_MARGIN {
            return self.award(Role::Right);
        }
        if self.bx > WIDTH + OUT_MARGIN {
            return self.award(Role::Left);
        }

        StepOutcome::Rally
    }

    fn hits_paddle(&self, paddle_y: f32) -> bool {
        paddle_y <= self.by && self.by <= paddle_y + PADDLE_H
    }

    fn award(&mut self, scorer: Role) -> StepOutcome {
        let (score, conceded) = match scorer {
            Role::Left => (&mut self.sl, Role::Right),
            _ => (&mut self.sr, Role::Left),
        };
        *score += 1;

        if *score >= WIN_SCORE {
            return StepOutcome::Won(scorer);
        }

        debug!("Point to {} ({}:{})", scorer, self.sl, self.sr);
        self.serve(Some(conceded));
        StepOutcome::Point(scorer)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            ly: self.ly,
            ry: self.ry,
            bx: self.bx,
            by: self.by,
            sl: self.sl,
            sr: self.sr,
        }
    }
}

/// Vertical return speed from where on the paddle the ball struck.
fn return_vy(ball_y: f32, paddle_y: f32) -> f32 {
    let half = PADDLE_H / 2.0;
    let rel = ((ball_y - (paddle_y + half)) / half).clamp(-1.0, 1.0);
    BALL_SPEED * RETURN_ANGLE_FACTOR * rel
}

/// Fixed-timestep accumulator decoupling simulation from loop jitter.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    dt: f32,
    accumulator: f32,
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(TICK_DT)
    }
}

impl FixedTimestep {
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            accumulator: 0.0,
        }
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Credits `elapsed` real time and returns how many whole ticks are now due.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        let mut frame = elapsed.as_secs_f32();
        if frame > MAX_FRAME_TIME {
            debug!(
                "Large frame time detected ({:.3}s), capping to {:.3}s",
                frame, MAX_FRAME_TIME
            );
            frame = MAX_FRAME_TIME;
        }
        self.accumulator += frame;

        let mut ticks = 0;
        while self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            ticks += 1;
        }
        ticks
    }

    /// Time credited but not yet consumed by a tick.
    pub fn pending(&self) -> f32 {
        self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const IDLE: PaddleInput = PaddleInput {
        up: false,
        down: false,
    };
    const UP: PaddleInput = PaddleInput {
        up: true,
        down: false,
    };
    const DOWN: PaddleInput = PaddleInput {
        up: false,
        down: true,
    };

    #[test]
    fn test_new_game_is_centered() {
        let game = GameState::with_seed(1);
        assert_eq!(game.ly, paddle_start_y());
        assert_eq!(game.ry, paddle_start_y());
        assert_eq!(game.bx, WIDTH / 2.0);
        assert_eq!(game.by, HEIGHT / 2.0);
        assert_eq!((game.sl, game.sr), (0, 0));
        assert_eq!(game.vx.abs(), BALL_SPEED);
    }

    #[test]
    fn test_serve_angle_range() {
        let mut game = GameState::with_seed(7);
        for _ in 0..200 {
            game.serve(None);
            let fraction = game.vy.abs() / BALL_SPEED;
            assert!((0.15..=0.45).contains(&fraction), "fraction {}", fraction);
        }
    }

    #[test]
    fn test_serve_direction_uses_both_sides() {
        let mut game = GameState::with_seed(42);
        let mut left = 0;
        let mut right = 0;
        for _ in 0..100 {
            game.serve(None);
            if game.vx > 0.0 {
                right += 1;
            } else {
                left += 1;
            }
        }
        assert!(left > 10 && right > 10);
    }

    #[test]
    fn test_same_seed_same_serves() {
        let mut a = GameState::with_seed(99);
        let mut b = GameState::with_seed(99);
        for _ in 0..10 {
            a.serve(None);
            b.serve(None);
            assert_eq!((a.vx, a.vy), (b.vx, b.vy));
        }
    }

    #[test]
    fn test_paddle_moves_and_clamps() {
        let mut game = GameState::with_seed(1);
        game.step(TICK_DT, DOWN, UP);
        assert_approx_eq!(game.ly, paddle_start_y() + PADDLE_SPEED * TICK_DT, 0.001);
        assert_approx_eq!(game.ry, paddle_start_y() - PADDLE_SPEED * TICK_DT, 0.001);

        for _ in 0..200 {
            game.bx = WIDTH / 2.0;
            game.step(TICK_DT, DOWN, UP);
        }
        assert_eq!(game.ly, HEIGHT - PADDLE_H);
        assert_eq!(game.ry, 0.0);
    }

    #[test]
    fn test_both_keys_cancel_out() {
        let input = PaddleInput {
            up: true,
            down: true,
        };
        assert_eq!(input.direction(), 0.0);
        assert_eq!(IDLE.direction(), 0.0);
        assert_eq!(UP.direction(), -1.0);
        assert_eq!(DOWN.direction(), 1.0);
    }

    #[test]
    fn test_top_wall_bounce() {
        let mut game = GameState::with_seed(1);
        game.by = BALL_R + 1.0;
        game.vx = 0.0;
        game.vy = -BALL_SPEED;
        game.step(TICK_DT, IDLE, IDLE);
        assert_eq!(game.by, BALL_R);
        assert!(game.vy > 0.0);
    }

    #[test]
    fn test_bottom_wall_bounce() {
        let mut game = GameState::with_seed(1);
        game.by = HEIGHT - BALL_R - 1.0;
        game.vx = 0.0;
        game.vy = BALL_SPEED;
        game.step(TICK_DT, IDLE, IDLE);
        assert_eq!(game.by, HEIGHT - BALL_R);
        assert!(game.vy < 0.0);
    }

    #[test]
    fn test_left_paddle_center_hit_returns_flat() {
        let mut game = GameState::with_seed(1);
        let face = PADDLE_MARGIN + PADDLE_W;
        game.bx = face + BALL_R + 2.0;
        game.vx = -BALL_SPEED;
        game.vy = 0.0;
        game.by = game.ly + PADDLE_H / 2.0;

        game.step(TICK_DT, IDLE, IDLE);

        assert_eq!(game.bx, face + BALL_R);
        assert_eq!(game.vx, BALL_SPEED);
        assert_approx_eq!(game.vy, 0.0, 0.001);
    }

    #[test]
    fn test_right_paddle_edge_hit_returns_angled() {
        let mut game = GameState::with_seed(1);
        let face = WIDTH - PADDLE_MARGIN - PADDLE_W;
        game.bx = face - BALL_R - 2.0;
        game.vx = BALL_SPEED;
        game.vy = 0.0;
        game.by = game.ry + PADDLE_H;

        game.step(TICK_DT, IDLE, IDLE);

        assert_eq!(game.bx, face - BALL_R);
        assert_eq!(game.vx, -BALL_SPEED);
        assert_approx_eq!(game.vy, BALL_SPEED * RETURN_ANGLE_FACTOR, 0.01);
    }

    #[test]
    fn test_paddle_ignored_when_ball_moves_away() {
        let mut game = GameState::with_seed(1);
        let face = PADDLE_MARGIN + PADDLE_W;
        game.bx = face;
        game.vx = BALL_SPEED;
        game.vy = 0.0;
        game.by = game.ly + PADDLE_H / 2.0;

        game.step(TICK_DT, IDLE, IDLE);
        assert!(game.vx > 0.0);
    }

    #[test]
    fn test_miss_awards_point_and_serves_toward_conceding_side() {
        let mut game = GameState::with_seed(3);
        game.bx = WIDTH + OUT_MARGIN - 1.0;
        game.by = 10.0;
        game.vx = BALL_SPEED;
        game.vy = 0.0;
        game.ry = HEIGHT - PADDLE_H;

        let outcome = game.step(TICK_DT, IDLE, IDLE);

        assert_eq!(outcome, StepOutcome::Point(Role::Left));
        assert_eq!((game.sl, game.sr), (1, 0));
        assert_eq!(game.bx, WIDTH / 2.0);
        assert!(game.vx > 0.0);

        game.bx = -OUT_MARGIN + 1.0;
        game.vx = -BALL_SPEED;
        game.by = 10.0;
        game.ly = HEIGHT - PADDLE_H;
        let outcome = game.step(TICK_DT, IDLE, IDLE);
        assert_eq!(outcome, StepOutcome::Point(Role::Right));
        assert_eq!((game.sl, game.sr), (1, 1));
        assert!(game.vx < 0.0);
    }

    #[test]
    fn test_reaching_win_score_reports_winner() {
        let mut game = GameState::with_seed(3);
        game.sr = WIN_SCORE - 1;
        game.bx = -OUT_MARGIN - 0.5;
        game.by = 10.0;
        game.vx = -BALL_SPEED;
        game.vy = 0.0;

        let outcome = game.step(TICK_DT, IDLE, IDLE);
        assert_eq!(outcome, StepOutcome::Won(Role::Right));
        assert_eq!(game.sr, WIN_SCORE);
    }

    #[test]
    fn test_partial_reset_keeps_score() {
        let mut game = GameState::with_seed(5);
        game.sl = 3;
        game.sr = 2;
        game.reset(false);
        assert_eq!((game.sl, game.sr), (3, 2));
        game.reset(true);
        assert_eq!((game.sl, game.sr), (0, 0));
    }

    #[test]
    fn test_invariants_hold_over_long_rally() {
        let mut game = GameState::with_seed(11);
        let mut rng = StdRng::seed_from_u64(12);
        let (mut sl, mut sr) = (0, 0);

        for _ in 0..20_000 {
            let left = PaddleInput {
                up: rng.gen_bool(0.3),
                down: rng.gen_bool(0.3),
            };
            let right = PaddleInput {
                up: rng.gen_bool(0.3),
                down: rng.gen_bool(0.3),
            };
            let outcome = game.step(TICK_DT, left, right);

            assert!(game.ly >= 0.0 && game.ly <= HEIGHT - PADDLE_H);
            assert!(game.ry >= 0.0 && game.ry <= HEIGHT - PADDLE_H);
            assert!(game.sl >= sl && game.sr >= sr);
            assert!(game.sl + game.sr - sl - sr <= 1);

            if let StepOutcome::Won(_) = outcome {
                game.reset(true);
                sl = 0;
                sr = 0;
                continue;
            }

            assert!(game.bx >= -OUT_MARGIN && game.bx <= WIDTH + OUT_MARGIN);
            assert!(game.by >= 0.0 && game.by <= HEIGHT);
            sl = game.sl;
            sr = game.sr;
        }
    }

    #[test]
    fn test_fixed_timestep_accumulates() {
        let mut timestep = FixedTimestep::new(0.010);
        assert_eq!(timestep.advance(Duration::from_millis(4)), 0);
        assert_eq!(timestep.advance(Duration::from_millis(4)), 0);
        assert_eq!(timestep.advance(Duration::from_millis(4)), 1);
        assert_approx_eq!(timestep.pending(), 0.002, 0.0001);
        assert_eq!(timestep.advance(Duration::from_millis(35)), 3);
    }

    #[test]
    fn test_fixed_timestep_caps_stalls() {
        let mut timestep = FixedTimestep::default();
        let ticks = timestep.advance(Duration::from_secs(10));
        assert!((14..=15).contains(&ticks), "ticks {}", ticks);
    }
}
