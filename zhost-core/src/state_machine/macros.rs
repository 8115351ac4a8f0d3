/// Generates a state machine implementation from a declarative syntax: the
/// possible states, inputs, side effects, conditions and transitions, plus an
/// initial state and a pattern identifying final states.
///
/// ```ignore
/// state_machine! { Door {
///     State = {
///         Closed,
///         Open,
///     },
///     Input = {
///         Push,
///         Pull if Unlocked,
///     },
///     Effect = {
///         Chime,
///     },
///     Condition = {
///         Unlocked,
///     },
///     Transitions = [
///         [Closed => [
///             [Push if Unlocked => ! Chime => Open],
///         ]],
///         [Open => [
///             [Pull => Closed],
///         ]],
///     ],
///     Initial = Closed,
///     Final = Open,
/// } }
/// ```
///
/// `State`, `Input` and `Effect` desugar to `enum`s. `Initial` is an
/// expression, `Final` is a pattern. Transitions are
/// `[Pattern (state) => [ [Pattern (input) [if Cond] [=> ! Effect] => Expr (new state)] ... ]]`.
#[macro_export]
macro_rules! state_machine {
    (
        $fsm_name:ident {
            State = $state_enum:tt,
            Input = $input_enum:tt,
            Effect = $effect_enum:tt,
            Condition = $cond_enum:tt,
            Transitions = [
                $( $transition:tt ),* $(,)?
            ],
            Initial = $initial:expr,
            Final = $done:pat $(,)?
        }
    ) => {
        paste::paste! {
            #[derive(Debug, Clone, PartialEq)]
            pub enum [<$fsm_name State>] $state_enum

            #[derive(Debug, Clone, PartialEq)]
            pub enum [<$fsm_name Input>] $input_enum

            #[derive(Debug, Clone, PartialEq)]
            pub enum [<$fsm_name Effect>] $effect_enum

            #[derive(Debug, Clone, Copy, PartialEq)]
            pub enum [<$fsm_name Condition>] $cond_enum

            #[derive(Debug, Clone, PartialEq)]
            pub struct [<$fsm_name Transition>] {
                effect: Option<[<$fsm_name Effect>]>,
                new_state: [<$fsm_name State>],
            }

            impl $crate::state_machine::StateMachineTransition for [<$fsm_name Transition>] {
                type S = [<$fsm_name State>];
                type E = [<$fsm_name Effect>];

                fn effect(&self) -> Option<Self::E> {
                    self.effect.clone()
                }

                fn new_state(&self) -> Self::S {
                    self.new_state.clone()
                }
            }

            pub struct $fsm_name {
                state: [<$fsm_name State>],
            }

            impl Default for $fsm_name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl $crate::state_machine::StateMachine for $fsm_name {
                type S = [<$fsm_name State>];
                type E = [<$fsm_name Effect>];
                type I = [<$fsm_name Input>];
                type C = [<$fsm_name Condition>];
                type T = [<$fsm_name Transition>];

                fn new() -> Self {
                    use [<$fsm_name State>]::*;
                    Self { state: $initial }
                }

                fn next(
                    &self,
                    input: Self::I,
                    evaluate_condition: impl Fn(Self::C) -> bool,
                ) -> Option<Self::T> {
                    use [<$fsm_name State>]::*;
                    use [<$fsm_name Input>]::*;
                    #[allow(unused_imports)]
                    use [<$fsm_name Effect>]::*;
                    use [<$fsm_name Condition>]::*;
                    state_machine!(@transition_match (self; input; evaluate_condition; $($transition)*))
                }

                fn transition(&mut self, new_state: Self::S) {
                    self.state = new_state;
                }

                fn state(&self) -> &Self::S {
                    &self.state
                }

                fn done(&self) -> bool {
                    matches!(self.state, $done)
                }
            }
        }
    };

    // From(val) => [ Input(val) => ! Effect(val) => To(val) ]
    (@transition_match (
        $self:ident; $input:ident; $eval:ident;
        [$from:pat => [
            $(,)?
            [$expected_input:pat $(if $cond:expr)? => ! $effect:expr => $to:expr]
            $($others:tt)*
        ]]
        $($rest:tt)*
    ) $($arms:tt)*) => {
        state_machine!(
            @transition_match (
                $self; $input; $eval; [$from => [ $($others)* ]]
                $($rest)*
            )
            $($arms)*
            ($from, $expected_input) $(if $eval($cond))? => Some(Self::T {
                effect: Some($effect),
                new_state: $to,
            }),
        )
    };

    // From(val) => [ Input(val) => To(val) ]
    (@transition_match (
        $self:ident; $input:ident; $eval:ident;
        [$from:pat => [
            $(,)?
            [$expected_input:pat $(if $cond:expr)? => $to:expr]
            $($others:tt)*
        ]]
        $($rest:tt)*
    ) $($arms:tt)*) => {
        state_machine!(
            @transition_match (
                $self; $input; $eval; [$from => [ $($others)* ]]
                $($rest)*
            )
            $($arms)*
            ($from, $expected_input) $(if $eval($cond))? => Some(Self::T {
                effect: None,
                new_state: $to,
            }),
        )
    };

    // One state fully handled.
    (@transition_match (
        $self:ident; $input:ident; $eval:ident;
        [$from:pat => [ $(,)? ]]
        $($rest:tt)* $(,)?
    ) $($arms:tt)*) => {
        state_machine!(
            @transition_match (
                $self; $input; $eval;
                $($rest)*
            )
            $($arms)*
        )
    };

    // All transitions handled.
    (@transition_match (
        $self:ident; $input:ident; $eval:ident;
        $(,)?
    ) $($arms:tt)*) => {
        match (&$self.state, $input) {
            $($arms)*
            _ => None,
        }
    };
}
