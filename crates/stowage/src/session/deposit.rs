use stowage_common::state::{self, check_deposit_state_transition};
use stowage_common::{
    ensure_stowage, Amount, Deposit, DepositNotification, DepositOutcome, DepositState, Error,
};
use tracing::instrument;
use uuid::Uuid;

use super::{Session, SessionInner, SessionState};

impl Session {
    /// Fund the session account
    ///
    /// Returns the `Pending` deposit once the ledger accepted the transaction. The outcome
    /// arrives later through the status stream, see [`Session::wait_for_deposit`].
    #[instrument(skip(self))]
    pub async fn deposit(&self, amount: Amount) -> Result<Deposit, Error> {
        self.inner.deposit(amount).await
    }
}

impl SessionInner {
    #[instrument(skip(self))]
    pub(crate) async fn deposit(&self, amount: Amount) -> Result<Deposit, Error> {
        ensure_stowage!(amount > Amount::ZERO, Error::InvalidAmount(amount));
        ensure_stowage!(!self.is_closed(), Error::SessionClosed);

        let in_flight = InFlightDeposit::start(self);
        let external_ref = self.ledger.submit_deposit(&self.account, amount).await?;

        let deposit = Deposit {
            id: Uuid::new_v4(),
            account: self.account.clone(),
            amount,
            state: DepositState::Pending,
            external_ref: Some(external_ref.clone()),
            failure_reason: None,
        };

        let parked = {
            let mut state = self.state.lock();
            state.deposits.push(deposit.clone());
            in_flight.record(&mut state);
            tracing::info!(
                "Deposit {} of {} submitted as {}",
                deposit.id,
                amount,
                external_ref
            );
            self.event_manager.publish(deposit.clone());
            state.take_parked(&external_ref)
        };

        self.balance_cache.invalidate(&self.account).await;

        if let Some(outcome) = parked {
            tracing::debug!("Applying parked notification for {}", external_ref);
            self.apply_deposit_notification(DepositNotification {
                external_ref,
                outcome,
            })
            .await;
        }

        Ok(deposit)
    }

    /// Resolve the deposit matching a ledger notification
    ///
    /// Unknown references are parked until the deposit is recorded. Notifications for a
    /// deposit that is already final are ignored.
    pub(crate) async fn apply_deposit_notification(&self, notification: DepositNotification) {
        let DepositNotification {
            external_ref,
            outcome,
        } = notification;

        if outcome == DepositOutcome::Confirmed {
            self.balance_cache.invalidate(&self.account).await;
        }

        let applied = {
            let mut state = self.state.lock();
            match state
                .deposits
                .iter_mut()
                .find(|deposit| deposit.external_ref.as_deref() == Some(external_ref.as_str()))
            {
                None => {
                    tracing::debug!("Parking notification for unknown deposit {}", external_ref);
                    state.park(external_ref, outcome);
                    false
                }
                Some(deposit) => match resolve(deposit, outcome) {
                    Ok(()) => {
                        match deposit.state {
                            DepositState::Failed => tracing::warn!(
                                "Deposit {} failed: {}",
                                deposit.id,
                                deposit.failure_reason.as_deref().unwrap_or_default()
                            ),
                            _ => tracing::info!("Deposit {} is {}", deposit.id, deposit.state),
                        }
                        self.event_manager.publish(deposit.clone());
                        true
                    }
                    Err(err) => {
                        tracing::debug!("Ignoring notification for {}: {}", external_ref, err);
                        false
                    }
                },
            }
        };

        if applied {
            self.deposit_updates.send_modify(|generation| *generation += 1);
        }
    }
}

/// Counts a deposit as pending from submission until it is recorded in the session
struct InFlightDeposit<'a> {
    inner: &'a SessionInner,
    recorded: bool,
}

impl<'a> InFlightDeposit<'a> {
    fn start(inner: &'a SessionInner) -> Self {
        inner.state.lock().in_flight_deposits += 1;
        Self {
            inner,
            recorded: false,
        }
    }

    /// Hand over to the recorded `Pending` deposit, under the same state lock
    fn record(mut self, state: &mut SessionState) {
        state.in_flight_deposits = state.in_flight_deposits.saturating_sub(1);
        self.recorded = true;
    }
}

impl Drop for InFlightDeposit<'_> {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }

        {
            let mut state = self.inner.state.lock();
            state.in_flight_deposits = state.in_flight_deposits.saturating_sub(1);
        }
        // submission refused or abandoned, deferred jobs re-check funds
        self.inner
            .deposit_updates
            .send_modify(|generation| *generation += 1);
    }
}

fn resolve(deposit: &mut Deposit, outcome: DepositOutcome) -> Result<(), state::Error> {
    let new_state = match outcome {
        DepositOutcome::Confirmed => DepositState::Confirmed,
        DepositOutcome::Failed(_) => DepositState::Failed,
    };

    check_deposit_state_transition(deposit.state, new_state)?;

    deposit.state = new_state;
    if let DepositOutcome::Failed(reason) = outcome {
        deposit.failure_reason = Some(reason);
    }

    Ok(())
}
