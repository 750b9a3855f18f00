//! Token Vesting Contract
//!
//! Custodies a fixed deposit of a SEP-41 token on behalf of a single
//! beneficiary and releases it in equal time-based installments. The
//! administrator configures the schedule and funds it from a payer that has
//! pre-approved an allowance; the beneficiary then withdraws whatever has
//! vested, as often as they like, until the deposit is exhausted. One
//! deployed instance covers one schedule; running several schedules (team,
//! marketing, post-sale) means deploying several independent instances.
//!
//! ## Storage Strategy
//! - `instance()`: `ScheduleConfig` (immutable after `init`) and
//!   `VestingState` (one small mutable record). Everything fits in the
//!   instance entry with a single TTL; no persistent keys are needed.
//!
//! ## State Machine
//!
//!   (configured) --initialize_from--> Active
//!   Active       --release-->         Active   [released grows toward total]
//!
//! Funding is a one-shot, terminal transition. Full release is a derived
//! condition, not a separate state: once `released == total_deposited` every
//! further `release` fails with `NothingToRelease`.
//!
//! ## Invariants
//! - `0 <= released <= total_deposited`.
//! - `start_time` and `total_deposited` are written exactly once, by
//!   `initialize_from`.
//! - The vested amount is non-decreasing in ledger time, capped at
//!   `total_deposited`, and equals `total_deposited` exactly once
//!   `installment_count` periods have elapsed (intermediate rounding leaves
//!   no dust behind).
//! - The released tally is committed to storage before the outbound token
//!   transfer.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token::TokenClient,
    Address, Env,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    Unauthorized = 3,
    NotActive = 4,
    NothingToRelease = 5,
    TransferFailed = 6,
    InvalidConfig = 7,
    Overflow = 8,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

/// Discriminants for all storage keys. Both live in `instance()` storage.
#[contracttype]
pub enum DataKey {
    /// Immutable schedule configuration, set once by `init`.
    Config,
    /// Mutable vesting accounting, created by `initialize_from`.
    Vesting,
}

/// Immutable configuration of one vesting schedule.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScheduleConfig {
    /// Only address authorized to fund the schedule.
    pub admin: Address,
    /// The SEP-41 token under vesting.
    pub token: Address,
    /// Only address authorized to withdraw released funds.
    pub beneficiary: Address,
    /// Length of one installment in seconds (> 0).
    pub period_seconds: u64,
    /// Total number of equal installments (>= 1).
    pub installment_count: u32,
}

/// Mutable accounting state. Its presence in storage marks the schedule as
/// funded and active.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VestingState {
    /// Ledger timestamp at which vesting began.
    pub start_time: u64,
    /// Quantity of the token pulled under custody at funding.
    pub total_deposited: i128,
    /// Cumulative quantity already paid to the beneficiary.
    pub released: i128,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct ScheduleFunded {
    #[topic]
    pub payer: Address,
    pub amount: i128,
    pub start_time: u64,
}

#[contractevent]
pub struct TokensReleased {
    #[topic]
    pub beneficiary: Address,
    pub amount: i128,
    pub released_total: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct TokenVesting;

#[contractimpl]
impl TokenVesting {
    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Configure the schedule. May only be called once.
    ///
    /// `admin` is the only address that may later fund the schedule.
    /// `token` is the asset contract, `beneficiary` the only address that may
    /// withdraw. `period_seconds` and `installment_count` must both be
    /// positive; together they fix the shape of the schedule forever.
    pub fn init(
        env: Env,
        admin: Address,
        token: Address,
        beneficiary: Address,
        period_seconds: u64,
        installment_count: u32,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(Error::AlreadyInitialized);
        }
        if period_seconds == 0 || installment_count == 0 {
            return Err(Error::InvalidConfig);
        }

        admin.require_auth();

        let config = ScheduleConfig {
            admin,
            token,
            beneficiary,
            period_seconds,
            installment_count,
        };
        env.storage().instance().set(&DataKey::Config, &config);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // initialize_from
    // -----------------------------------------------------------------------

    /// Fund the schedule and start the vesting clock. Admin only, one-shot.
    ///
    /// Pulls the full allowance `payer` has granted this contract on the
    /// token, records the quantity actually received as `total_deposited`,
    /// and stamps `start_time` with the current ledger timestamp. A missing
    /// allowance or a failed pull returns `TransferFailed` and leaves no
    /// state behind. Returns the deposited amount.
    pub fn initialize_from(env: Env, caller: Address, payer: Address) -> Result<i128, Error> {
        let config = get_config(&env)?;

        caller.require_auth();
        if caller != config.admin {
            return Err(Error::Unauthorized);
        }
        if env.storage().instance().has(&DataKey::Vesting) {
            return Err(Error::AlreadyInitialized);
        }

        let token = TokenClient::new(&env, &config.token);
        let custody = env.current_contract_address();

        let amount = token.allowance(&payer, &custody);
        if amount <= 0 {
            return Err(Error::TransferFailed);
        }

        let held_before = token.balance(&custody);
        if token
            .try_transfer_from(&custody, &payer, &custody, &amount)
            .is_err()
        {
            return Err(Error::TransferFailed);
        }
        let received = token.balance(&custody) - held_before;
        if received <= 0 {
            return Err(Error::TransferFailed);
        }

        let vesting = VestingState {
            start_time: env.ledger().timestamp(),
            total_deposited: received,
            released: 0,
        };
        env.storage().instance().set(&DataKey::Vesting, &vesting);

        ScheduleFunded {
            payer,
            amount: received,
            start_time: vesting.start_time,
        }
        .publish(&env);

        Ok(received)
    }

    // -----------------------------------------------------------------------
    // release
    // -----------------------------------------------------------------------

    /// Withdraw everything vested but not yet released. Beneficiary only.
    ///
    /// Fails with `NothingToRelease` when no new funds have vested since the
    /// last withdrawal, including forever after the deposit is exhausted.
    /// Returns the amount paid out.
    pub fn release(env: Env, caller: Address) -> Result<i128, Error> {
        let config = get_config(&env)?;

        caller.require_auth();
        if caller != config.beneficiary {
            return Err(Error::Unauthorized);
        }
        let mut vesting = get_vesting(&env).ok_or(Error::NotActive)?;

        let available = releasable(&config, &vesting, env.ledger().timestamp());
        if available == 0 {
            return Err(Error::NothingToRelease);
        }

        // Commit the released tally before the transfer (reentrancy guard).
        vesting.released = vesting
            .released
            .checked_add(available)
            .ok_or(Error::Overflow)?;
        env.storage().instance().set(&DataKey::Vesting, &vesting);

        let token = TokenClient::new(&env, &config.token);
        if token
            .try_transfer(&env.current_contract_address(), &config.beneficiary, &available)
            .is_err()
        {
            return Err(Error::TransferFailed);
        }

        TokensReleased {
            beneficiary: config.beneficiary,
            amount: available,
            released_total: vesting.released,
        }
        .publish(&env);

        Ok(available)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Index of the installment period the clock is currently in. Keeps
    /// counting past `installment_count` once the schedule has fully matured;
    /// the vested amount is what gets capped, not the index.
    pub fn current_installment(env: Env) -> u64 {
        match (get_config(&env).ok(), get_vesting(&env)) {
            (Some(config), Some(vesting)) => {
                installment_index(&config, &vesting, env.ledger().timestamp())
            }
            _ => 0,
        }
    }

    /// Total quantity vested so far, released or not. 0 before funding.
    pub fn vested_amount(env: Env) -> i128 {
        match (get_config(&env).ok(), get_vesting(&env)) {
            (Some(config), Some(vesting)) => {
                vested(&config, &vesting, env.ledger().timestamp())
            }
            _ => 0,
        }
    }

    /// Quantity the beneficiary could withdraw right now. 0 before funding.
    pub fn tokens_available(env: Env) -> i128 {
        match (get_config(&env).ok(), get_vesting(&env)) {
            (Some(config), Some(vesting)) => {
                releasable(&config, &vesting, env.ledger().timestamp())
            }
            _ => 0,
        }
    }

    pub fn admin(env: Env) -> Result<Address, Error> {
        Ok(get_config(&env)?.admin)
    }

    pub fn token(env: Env) -> Result<Address, Error> {
        Ok(get_config(&env)?.token)
    }

    pub fn beneficiary(env: Env) -> Result<Address, Error> {
        Ok(get_config(&env)?.beneficiary)
    }

    pub fn period(env: Env) -> Result<u64, Error> {
        Ok(get_config(&env)?.period_seconds)
    }

    pub fn installments(env: Env) -> Result<u32, Error> {
        Ok(get_config(&env)?.installment_count)
    }

    /// Ledger timestamp at which vesting began. 0 before funding.
    pub fn start_time(env: Env) -> u64 {
        get_vesting(&env).map_or(0, |v| v.start_time)
    }

    /// Quantity placed under custody at funding. 0 before funding.
    pub fn total_deposited(env: Env) -> i128 {
        get_vesting(&env).map_or(0, |v| v.total_deposited)
    }

    /// Cumulative quantity already paid to the beneficiary.
    pub fn released(env: Env) -> i128 {
        get_vesting(&env).map_or(0, |v| v.released)
    }

    /// Whether the schedule has been funded.
    pub fn is_active(env: Env) -> bool {
        env.storage().instance().has(&DataKey::Vesting)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn get_config(env: &Env) -> Result<ScheduleConfig, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(Error::NotInitialized)
}

fn get_vesting(env: &Env) -> Option<VestingState> {
    env.storage().instance().get(&DataKey::Vesting)
}

fn installment_index(config: &ScheduleConfig, vesting: &VestingState, now: u64) -> u64 {
    now.saturating_sub(vesting.start_time) / config.period_seconds
}

/// Vested quantity at `now`: `total * n / count` for the capped installment
/// index `n`, rounded half-up. At `n == count` the division is exact, so the
/// whole deposit vests with no residue.
fn vested(config: &ScheduleConfig, vesting: &VestingState, now: u64) -> i128 {
    let n = installment_index(config, vesting, now).min(config.installment_count as u64) as u128;
    let count = config.installment_count as u128;
    let scaled = (vesting.total_deposited as u128).saturating_mul(n);
    (scaled.saturating_add(count / 2) / count) as i128
}

fn releasable(config: &ScheduleConfig, vesting: &VestingState, now: u64) -> i128 {
    vested(config, vesting, now)
        .saturating_sub(vesting.released)
        .max(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
