use zhost_core::state_machine;
use zhost_core::state_machine::StateMachine;

/// Outcome of one outbound `DataFrame`'s delivery attempt (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDeliveryResult {
    /// The controller ACKed the frame.
    Delivered,
    /// Retries were exhausted without an ACK.
    Failed,
}

state_machine! { LinkMachine {
    State = {
        Idle,
        AwaitingAck,
        Retry,
        Done(LinkDeliveryResult),
    },
    Input = {
        Dequeued,
        Ack,
        Nak,
        Can,
        Timeout,
        BackoffElapsed,
    },
    Effect = {},
    Condition = {
        RetriesRemaining,
    },
    Transitions = [
        [Idle => [
            [Dequeued => AwaitingAck],
        ]],
        [AwaitingAck => [
            [Ack => Done(LinkDeliveryResult::Delivered)],
            [Nak => Retry],
            [Can => Retry],
            [Timeout => Retry],
        ]],
        [Retry => [
            [BackoffElapsed if RetriesRemaining => AwaitingAck],
            [BackoffElapsed => Done(LinkDeliveryResult::Failed)],
        ]],
    ],
    Initial = Idle,
    Final = Done(_),
} }

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ack_delivers() {
        let mut m = LinkMachine::new();
        let t = m.next(LinkMachineInput::Dequeued, |_| false).unwrap();
        m.transition(t.new_state());
        let t = m.next(LinkMachineInput::Ack, |_| false).unwrap();
        m.transition(t.new_state());
        assert!(m.done());
        assert_eq!(*m.state(), LinkMachineState::Done(LinkDeliveryResult::Delivered));
    }

    #[test]
    fn test_can_twice_then_ack_succeeds() {
        let mut m = LinkMachine::new();
        let t = m.next(LinkMachineInput::Dequeued, |_| false).unwrap();
        m.transition(t.new_state());

        for _ in 0..2 {
            let t = m.next(LinkMachineInput::Can, |_| false).unwrap();
            m.transition(t.new_state());
            assert_eq!(*m.state(), LinkMachineState::Retry);
            let t = m
                .next(LinkMachineInput::BackoffElapsed, |c| matches!(c, LinkMachineCondition::RetriesRemaining))
                .unwrap();
            m.transition(t.new_state());
            assert_eq!(*m.state(), LinkMachineState::AwaitingAck);
        }

        let t = m.next(LinkMachineInput::Ack, |_| false).unwrap();
        m.transition(t.new_state());
        assert_eq!(*m.state(), LinkMachineState::Done(LinkDeliveryResult::Delivered));
    }

    #[test]
    fn test_retries_exhausted_fails() {
        let mut m = LinkMachine::new();
        let t = m.next(LinkMachineInput::Dequeued, |_| false).unwrap();
        m.transition(t.new_state());
        let t = m.next(LinkMachineInput::Timeout, |_| false).unwrap();
        m.transition(t.new_state());
        let t = m.next(LinkMachineInput::BackoffElapsed, |_| false).unwrap();
        m.transition(t.new_state());
        assert_eq!(*m.state(), LinkMachineState::Done(LinkDeliveryResult::Failed));
    }
}
